// Gateway configuration: remote credentials plus salon scheduling policy

use crate::error::ConfigError;
use chrono_tz::Tz;
use std::time::Duration;
use tracing::warn;

pub const ENV_BASE_URL: &str = "SIMPLYBOOK_BASE_URL";
pub const ENV_COMPANY: &str = "SIMPLYBOOK_COMPANY";
pub const ENV_API_KEY: &str = "SIMPLYBOOK_API_KEY";
pub const ENV_SECRET_KEY: &str = "SIMPLYBOOK_SECRET_KEY";
pub const ENV_SALON_TIMEZONE: &str = "SALON_TIMEZONE";
pub const ENV_UTC_OFFSET_MINUTES: &str = "SALON_UTC_OFFSET_MINUTES";
pub const ENV_MIN_RESCHEDULE_HOURS: &str = "MIN_RESCHEDULE_HOURS";

pub const DEFAULT_SALON_TIMEZONE: Tz = Tz::Asia__Singapore;
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 480;
pub const DEFAULT_MIN_RESCHEDULE_HOURS: i64 = 24;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_SERVICE_DURATION_TTL_SECONDS: u64 = 600;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub company: String,
    pub api_key: String,
    pub secret_key: String,
    pub salon_timezone: Tz,
    pub utc_offset_minutes: i32,
    pub min_reschedule_hours: i64,
    pub request_timeout_ms: u64,
    pub service_duration_ttl_seconds: u64,
}

impl GatewayConfig {
    // Credentials are required, everything else falls back to the salon defaults.
    pub fn new(
        base_url: impl Into<String>,
        company: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            company: company.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            salon_timezone: DEFAULT_SALON_TIMEZONE,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            min_reschedule_hours: DEFAULT_MIN_RESCHEDULE_HOURS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            service_duration_ttl_seconds: DEFAULT_SERVICE_DURATION_TTL_SECONDS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Same as from_env but reads variables through `lookup`, so callers (and tests)
    // are not tied to the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let required = [ENV_BASE_URL, ENV_COMPANY, ENV_API_KEY, ENV_SECRET_KEY];
        let missing: Vec<String> = required
            .iter()
            .filter(|key| read(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let mut config = Self::new(
            read(ENV_BASE_URL).unwrap_or_default(),
            read(ENV_COMPANY).unwrap_or_default(),
            read(ENV_API_KEY).unwrap_or_default(),
            read(ENV_SECRET_KEY).unwrap_or_default(),
        );

        match read(ENV_SALON_TIMEZONE) {
            Some(value) => {
                config.salon_timezone = value.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                    key: ENV_SALON_TIMEZONE.to_string(),
                    reason: e.to_string(),
                })?;
            }
            None => warn!(
                "{} not set, defaulting to {}",
                ENV_SALON_TIMEZONE,
                DEFAULT_SALON_TIMEZONE.name()
            ),
        }

        match read(ENV_UTC_OFFSET_MINUTES) {
            Some(value) => {
                config.utc_offset_minutes = parse_number(ENV_UTC_OFFSET_MINUTES, &value)?
            }
            None => warn!(
                "{} not set, defaulting to {} (UTC+8)",
                ENV_UTC_OFFSET_MINUTES, DEFAULT_UTC_OFFSET_MINUTES
            ),
        }

        match read(ENV_MIN_RESCHEDULE_HOURS) {
            Some(value) => {
                config.min_reschedule_hours = parse_number(ENV_MIN_RESCHEDULE_HOURS, &value)?
            }
            None => warn!(
                "{} not set, defaulting to {} hours",
                ENV_MIN_RESCHEDULE_HOURS, DEFAULT_MIN_RESCHEDULE_HOURS
            ),
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn service_duration_ttl(&self) -> Duration {
        Duration::from_secs(self.service_duration_ttl_seconds)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
