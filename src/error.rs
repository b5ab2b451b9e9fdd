// Error taxonomy shared by every operation the gateway exposes

use thiserror::Error;

// Failures surfaced to the layer that consumes the gateway.
// Clone is required: one failed login is delivered to every caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("RPC call failed ({method}): {message}")]
    Rpc { method: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed upstream data: {0}")]
    MalformedUpstreamData(String),

    #[error("Bookings can only be changed at least {min_hours} {} in advance.", hour_noun(.min_hours))]
    TooLate { min_hours: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Selected time is no longer available")]
    SlotUnavailable,

    #[error("Booking failed: {0}")]
    BookingFailed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Initialization error: {0}")]
    InitError(String),
}

fn hour_noun(hours: &i64) -> &'static str {
    if *hours == 1 {
        "hour"
    } else {
        "hours"
    }
}

impl GatewayError {
    pub fn rpc(method: &str, message: impl Into<String>) -> Self {
        GatewayError::Rpc {
            method: method.to_string(),
            message: message.into(),
        }
    }

    // Failures caused by what the caller asked for, as opposed to faults on our side
    // or upstream.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            GatewayError::TooLate { .. }
                | GatewayError::InvalidInput(_)
                | GatewayError::SlotUnavailable
                | GatewayError::NotFound(_)
        )
    }

    // Message safe to show to an end user. Upstream text is never relayed.
    // `action` completes the fallback sentence, e.g. "reschedule booking".
    pub fn public_message(&self, action: &str) -> String {
        match self {
            GatewayError::TooLate { .. } => self.to_string(),
            GatewayError::SlotUnavailable => {
                "Selected time is no longer available. Please choose another slot.".to_string()
            }
            GatewayError::NotFound(_) => {
                "Booking not found. Please verify the booking ID.".to_string()
            }
            GatewayError::InvalidInput(_) => "Invalid request parameters.".to_string(),
            GatewayError::AuthenticationFailed(_) => {
                "Authentication failed. Please try again.".to_string()
            }
            GatewayError::Rpc { message, .. } => {
                let message = message.to_lowercase();
                if message.contains("token") || message.contains("unauthorized") {
                    "Authentication failed. Please try again.".to_string()
                } else if message.contains("validation") || message.contains("invalid") {
                    "Invalid request parameters.".to_string()
                } else if message.contains("timeout") || message.contains("timed out") {
                    "Request timed out. Please try again.".to_string()
                } else if message.contains("network") || message.contains("connection") {
                    "Service unavailable. Please try again later.".to_string()
                } else if message.contains("booking") && message.contains("not found") {
                    "Booking not found. Please verify the booking ID.".to_string()
                } else {
                    generic_failure(action)
                }
            }
            GatewayError::MalformedUpstreamData(_) | GatewayError::BookingFailed(_) => {
                generic_failure(action)
            }
        }
    }
}

fn generic_failure(action: &str) -> String {
    format!("Failed to {}. Please try again later.", action)
}
