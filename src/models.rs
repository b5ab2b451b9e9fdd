// Data structures exchanged with the scheduling platform and handed back to callers

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// One bookable start time. `time` is HH:MM:SS in the salon timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub provider_id: u64,
    pub time: String,
}

// Entry of getCartesianStartTimeMatrix
#[derive(Debug, Deserialize)]
pub struct MatrixEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub provider_id: u64,
    #[serde(default, deserialize_with = "deserialize_timeslots")]
    pub timeslots: HashMap<String, Vec<String>>,
}

// Input of createBooking
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub service_id: u64,
    #[serde(default)]
    pub provider_id: Option<u64>,
    pub date: String,
    pub time: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClientData<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
}

// Result of the remote `book` method
#[derive(Debug, Deserialize)]
pub struct BookResult {
    #[serde(default)]
    pub bookings: Vec<BookedRecord>,
    #[serde(default, deserialize_with = "deserialize_opt_flag")]
    pub require_payment: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BookedRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    pub hash: String,
    #[serde(default, deserialize_with = "deserialize_opt_flag")]
    pub require_payment: Option<bool>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
}

// Normalized subset of a freshly created booking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: u64,
    pub booking_hash: String,
    pub require_payment: bool,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
}

// Result of getBookingDetails. Fields this crate does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub event_id: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub unit_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RescheduleOutcome {
    pub old_start: String,
    pub new_start: String,
    pub new_end: String,
    pub moved: bool,
}

// The platform is PHP backed: ids arrive as numbers or numeric strings, flags as
// booleans, 0/1 or "0"/"1", and empty maps are serialized as [].

pub(crate) fn id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid id: {}", value)))
}

pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => id_from_value(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid id: {}", value))),
    }
}

pub(crate) fn deserialize_opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => flag_from_value(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid flag: {}", value))),
    }
}

fn deserialize_timeslots<'de, D>(deserializer: D) -> Result<HashMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(date, times)| -> Result<(String, Vec<String>), D::Error> {
                let times = match times {
                    Value::Null => Vec::new(),
                    other => serde_json::from_value::<Vec<String>>(other)
                        .map_err(|e| D::Error::custom(format!("timeslots for {}: {}", date, e)))?,
                };
                Ok((date, times))
            })
            .collect(),
        Value::Array(items) if items.is_empty() => Ok(HashMap::new()),
        Value::Null => Ok(HashMap::new()),
        other => Err(D::Error::custom(format!("invalid timeslots: {}", other))),
    }
}
