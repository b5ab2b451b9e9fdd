// Booking operations: create a booking, fetch an existing one by signed id

use crate::availability::validate_date;
use crate::error::GatewayError;
use crate::gateway::RpcGateway;
use crate::models::{BookResult, BookingConfirmation, BookingDetails, ClientData, NewBooking};
use crate::signing::booking_sign;
use chrono::NaiveTime;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

// Seats requested per booking
const BOOKING_COUNT: u64 = 1;

pub struct BookingOperations {
    gateway: Arc<RpcGateway>,
    secret_key: String,
}

impl BookingOperations {
    pub fn new(gateway: Arc<RpcGateway>, secret_key: impl Into<String>) -> Self {
        Self {
            gateway,
            secret_key: secret_key.into(),
        }
    }

    pub async fn create(&self, booking: &NewBooking) -> Result<BookingConfirmation, GatewayError> {
        validate_date(&booking.date)?;
        validate_time(&booking.time)?;

        let client = ClientData {
            name: &booking.name,
            email: &booking.email,
            phone: &booking.phone,
        };
        let params = vec![
            json!(booking.service_id),
            json!(booking.provider_id.unwrap_or(0)),
            json!(booking.date),
            json!(booking.time),
            json!(client),
            json!([]),
            json!(BOOKING_COUNT),
        ];

        // An undecodable record is as unusable as a missing one.
        let value = self.gateway.call("book", params).await?;
        let result: Option<BookResult> = serde_json::from_value(value).map_err(|e| {
            GatewayError::BookingFailed(format!("unusable booking data returned: {}", e))
        })?;
        let result = result.ok_or_else(|| {
            GatewayError::BookingFailed("booking created but no booking data returned".to_string())
        })?;
        let require_payment_fallback = result.require_payment;
        let record = result.bookings.into_iter().next().ok_or_else(|| {
            GatewayError::BookingFailed("booking created but no booking data returned".to_string())
        })?;

        info!(
            booking_id = record.id,
            service_id = booking.service_id,
            date = %booking.date,
            time = %booking.time,
            "Booking created"
        );

        Ok(BookingConfirmation {
            booking_id: record.id,
            booking_hash: record.hash,
            require_payment: record
                .require_payment
                .or(require_payment_fallback)
                .unwrap_or(false),
            start_date_time: record.start_date_time,
            end_date_time: record.end_date_time,
        })
    }

    // The platform documents this sign only for rescheduleBook; getBookingDetails is
    // assumed to accept the same scheme.
    pub async fn details(
        &self,
        booking_id: &str,
        booking_hash: &str,
    ) -> Result<BookingDetails, GatewayError> {
        let numeric_id = parse_booking_id(booking_id)?;
        let sign = self.sign(booking_id, booking_hash);

        let details: Option<BookingDetails> = self
            .gateway
            .call_as("getBookingDetails", vec![json!(numeric_id), json!(sign)])
            .await?;
        details.ok_or_else(|| GatewayError::NotFound(format!("booking {}", booking_id)))
    }

    pub fn sign(&self, booking_id: &str, booking_hash: &str) -> String {
        booking_sign(booking_id, booking_hash, &self.secret_key)
    }
}

pub(crate) fn parse_booking_id(booking_id: &str) -> Result<u64, GatewayError> {
    booking_id
        .trim()
        .parse::<u64>()
        .map_err(|_| {
            GatewayError::InvalidInput(format!("booking id must be numeric: {}", booking_id))
        })
}

pub(crate) fn validate_time(time: &str) -> Result<NaiveTime, GatewayError> {
    if time.len() != 8 {
        return Err(GatewayError::InvalidInput(format!("time must be HH:MM:SS: {}", time)));
    }
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .map_err(|_| GatewayError::InvalidInput(format!("time must be HH:MM:SS: {}", time)))
}
