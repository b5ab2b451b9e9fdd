// Booking gateway for a SimplyBook-style JSON-RPC scheduling platform

pub mod availability;
pub mod booking;
pub mod client;
pub mod config;
pub mod durations;
pub mod error;
pub mod gateway;
pub mod models;
pub mod reschedule;
pub mod session;
pub mod signing;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock_remote;

// Re-export key types for convenience
pub use availability::{filter_window, flatten_matrix, AvailabilityResolver};
pub use booking::BookingOperations;
pub use client::{SchedulerClient, SchedulingApi};
pub use config::GatewayConfig;
pub use durations::ServiceDurationCache;
pub use error::{ConfigError, GatewayError};
pub use gateway::{GatewayStatsReport, RpcGateway};
pub use models::{
    BookingConfirmation, BookingDetails, MatrixEntry, NewBooking, RescheduleOutcome, Slot,
};
pub use reschedule::{NoticePolicy, RescheduleWindow, RescheduleWorkflow};
pub use session::SessionManager;
pub use signing::booking_sign;
pub use transport::{HttpTransport, RpcTransport, TransportError};
