// Reschedule workflow
//
// lookup -> parse -> notice policy -> duration -> new window -> re-verify slot -> commit
//
// The platform has no transaction spanning these calls. Nothing is compensated: if the
// commit fails after the slot was verified, the booking is unchanged and the caller has
// to query availability again and retry.

use crate::availability::{validate_date, AvailabilityResolver};
use crate::booking::{parse_booking_id, validate_time, BookingOperations};
use crate::error::GatewayError;
use crate::gateway::RpcGateway;
use crate::models::RescheduleOutcome;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoticePolicy {
    pub min_hours: i64,
}

impl NoticePolicy {
    pub fn new(min_hours: i64) -> Self {
        Self { min_hours }
    }

    pub fn hours_until(start: &DateTime<Tz>, now: &DateTime<Tz>) -> f64 {
        (*start - *now).num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn allows(&self, start: &DateTime<Tz>, now: &DateTime<Tz>) -> bool {
        Self::hours_until(start, now) >= self.min_hours as f64
    }

    pub fn check(&self, start: &DateTime<Tz>, now: &DateTime<Tz>) -> Result<(), GatewayError> {
        if self.allows(start, now) {
            Ok(())
        } else {
            Err(GatewayError::TooLate {
                min_hours: self.min_hours,
            })
        }
    }
}

// Times of one reschedule attempt. The new end always keeps the original duration.
#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleWindow {
    pub original_start: DateTime<Tz>,
    pub original_end: DateTime<Tz>,
    pub duration_minutes: i64,
    pub new_start: DateTime<Tz>,
    pub new_end: DateTime<Tz>,
}

impl RescheduleWindow {
    pub fn plan(
        original_start: DateTime<Tz>,
        original_end: DateTime<Tz>,
        new_start: DateTime<Tz>,
    ) -> Self {
        let seconds = (original_end - original_start).num_seconds();
        let duration_minutes = (seconds as f64 / 60.0).round() as i64;
        let new_end = new_start + Duration::minutes(duration_minutes);
        Self {
            original_start,
            original_end,
            duration_minutes,
            new_start,
            new_end,
        }
    }
}

// Parses `yyyy-MM-dd HH:mm:ss` as wall-clock time in `tz`.
pub fn parse_salon_timestamp(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()?;
    tz.from_local_datetime(&naive).earliest()
}

pub struct RescheduleWorkflow {
    gateway: Arc<RpcGateway>,
    bookings: Arc<BookingOperations>,
    resolver: Arc<AvailabilityResolver>,
    timezone: Tz,
    utc_offset_minutes: i32,
    policy: NoticePolicy,
}

impl RescheduleWorkflow {
    pub fn new(
        gateway: Arc<RpcGateway>,
        bookings: Arc<BookingOperations>,
        resolver: Arc<AvailabilityResolver>,
        timezone: Tz,
        utc_offset_minutes: i32,
        policy: NoticePolicy,
    ) -> Self {
        Self {
            gateway,
            bookings,
            resolver,
            timezone,
            utc_offset_minutes,
            policy,
        }
    }

    pub async fn run(
        &self,
        booking_id: &str,
        booking_hash: &str,
        new_date: &str,
        new_time: &str,
    ) -> Result<RescheduleOutcome, GatewayError> {
        let numeric_id = parse_booking_id(booking_id)?;

        // Lookup
        let details = self.bookings.details(booking_id, booking_hash).await?;
        let (old_start, old_end) = match (&details.start_date_time, &details.end_date_time) {
            (Some(start), Some(end)) => (start.clone(), end.clone()),
            _ => return Err(GatewayError::NotFound(format!("booking {}", booking_id))),
        };

        // Parse
        let original_start = self.parse_upstream(&old_start, "start_date_time")?;
        let original_end = self.parse_upstream(&old_end, "end_date_time")?;

        // Notice policy, measured against the original appointment
        let now = Utc::now().with_timezone(&self.timezone);
        self.policy.check(&original_start, &now)?;

        // Duration and new window
        let new_start = self.parse_requested(new_date, new_time)?;
        let window = RescheduleWindow::plan(original_start, original_end, new_start);

        // Re-verify the slot: it may have been taken since the caller last looked.
        let service_id = details.event_id.ok_or_else(|| {
            GatewayError::MalformedUpstreamData(format!("booking {} has no event_id", booking_id))
        })?;
        let slots = self
            .resolver
            .resolve(service_id, new_date, details.unit_id, None, None)
            .await?;
        if !slots.iter().any(|slot| slot.time == new_time) {
            info!(booking_id, new_date, new_time, "Requested slot no longer available");
            return Err(GatewayError::SlotUnavailable);
        }

        // Commit
        let sign = self.bookings.sign(booking_id, booking_hash);
        let params = vec![
            json!(numeric_id),
            json!(sign),
            json!(new_date),
            json!(new_time),
            json!(window.new_end.format("%Y-%m-%d").to_string()),
            json!(window.new_end.format("%H:%M:%S").to_string()),
            json!([]),
            json!(self.utc_offset_minutes),
            json!(self.timezone.name()),
        ];
        let result = self.gateway.call("rescheduleBook", params).await?;
        let moved = matches!(result, Value::Bool(true));
        if !moved {
            warn!(booking_id, result = %result, "rescheduleBook did not confirm the move");
        }

        info!(
            booking_id,
            old_start = %old_start,
            new_start = %window.new_start.format(TIMESTAMP_FORMAT),
            duration_minutes = window.duration_minutes,
            moved,
            "Reschedule finished"
        );

        Ok(RescheduleOutcome {
            old_start,
            new_start: window.new_start.format(TIMESTAMP_FORMAT).to_string(),
            new_end: window.new_end.format(TIMESTAMP_FORMAT).to_string(),
            moved,
        })
    }

    fn parse_upstream(&self, value: &str, field: &str) -> Result<DateTime<Tz>, GatewayError> {
        parse_salon_timestamp(value, &self.timezone).ok_or_else(|| {
            GatewayError::MalformedUpstreamData(format!("invalid booking {}: {}", field, value))
        })
    }

    fn parse_requested(&self, date: &str, time: &str) -> Result<DateTime<Tz>, GatewayError> {
        let date = validate_date(date)?;
        let time = validate_time(time)?;
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| GatewayError::InvalidInput("invalid new date or time".to_string()))
    }
}
