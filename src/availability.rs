// Availability resolver: flattens the platform's start-time matrix into slots

use crate::error::GatewayError;
use crate::gateway::RpcGateway;
use crate::models::{MatrixEntry, Slot};
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const MATRIX_METHOD: &str = "getCartesianStartTimeMatrix";

// Provider filter value meaning "any provider"
pub const ANY_PROVIDER: u64 = 0;

pub struct AvailabilityResolver {
    gateway: Arc<RpcGateway>,
}

impl AvailabilityResolver {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self { gateway }
    }

    // Slots of `service_id` on `date` (YYYY-MM-DD) in the order the platform lists
    // them. `from_time`/`to_time` (HH:MM) narrow the remote query; without them the
    // whole calendar day is requested.
    pub async fn resolve(
        &self,
        service_id: u64,
        date: &str,
        provider_id: Option<u64>,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Slot>, GatewayError> {
        validate_date(date)?;
        let from = match from_time {
            Some(time) => format!("{} {}:00", date, validate_hour_minute(time)?),
            None => format!("{} 00:00:00", date),
        };
        let to = match to_time {
            Some(time) => format!("{} {}:00", date, validate_hour_minute(time)?),
            None => format!("{} 23:59:59", date),
        };
        let unit = provider_id.unwrap_or(ANY_PROVIDER);

        let params = vec![
            json!(from),
            json!(to),
            json!(service_id),
            json!(unit),
            json!(1),
            json!(0),
            json!([]),
        ];
        let matrix: Option<Vec<MatrixEntry>> = self.gateway.call_as(MATRIX_METHOD, params).await?;
        let slots = flatten_matrix(&matrix.unwrap_or_default(), date);

        debug!(service_id, date, unit, slots = slots.len(), "Resolved availability");
        Ok(slots)
    }
}

// Keeps only `date`'s times, provider by provider, in response order.
pub fn flatten_matrix(matrix: &[MatrixEntry], date: &str) -> Vec<Slot> {
    matrix
        .iter()
        .flat_map(|entry| {
            entry
                .timeslots
                .get(date)
                .into_iter()
                .flatten()
                .map(move |time| Slot {
                    provider_id: entry.provider_id,
                    time: time.clone(),
                })
        })
        .collect()
}

// Inclusive HH:MM window. Slot times share the HH:MM:SS layout, so string order is
// chronological order within a day.
pub fn filter_window(slots: Vec<Slot>, from_time: &str, to_time: &str) -> Vec<Slot> {
    let from = format!("{}:00", from_time);
    let to = format!("{}:00", to_time);
    slots
        .into_iter()
        .filter(|slot| slot.time.as_str() >= from.as_str() && slot.time.as_str() <= to.as_str())
        .collect()
}

pub(crate) fn validate_date(date: &str) -> Result<NaiveDate, GatewayError> {
    if date.len() != 10 {
        return Err(GatewayError::InvalidInput(format!("date must be YYYY-MM-DD: {}", date)));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| GatewayError::InvalidInput(format!("date must be YYYY-MM-DD: {}", date)))
}

fn validate_hour_minute(time: &str) -> Result<&str, GatewayError> {
    if time.len() == 5 && NaiveTime::parse_from_str(time, "%H:%M").is_ok() {
        Ok(time)
    } else {
        Err(GatewayError::InvalidInput(format!("time must be HH:MM: {}", time)))
    }
}
