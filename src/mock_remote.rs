// In-memory stand-in for the scheduling platform, used by the unit tests.
// Speaks the same JSON-RPC methods as the real API: token issuing, service list,
// start-time matrix, booking, signed details and signed reschedule.

use crate::config::GatewayConfig;
use crate::models::id_from_value;
use crate::signing::booking_sign;
use crate::transport::{
    Endpoint, RpcRequest, RpcResponse, RpcTransport, SessionHeaders, TransportError,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct StoredBooking {
    pub id: u64,
    pub hash: String,
    pub event_id: u64,
    pub unit_id: u64,
    pub start: String,
    pub end: String,
    pub client: Value,
}

enum ScriptedFailure {
    Remote(String),
    Status(u16),
    Timeout,
}

#[derive(Default)]
struct PlatformState {
    services: BTreeMap<u64, Value>,
    // provider id -> date -> start times, in insertion order
    providers: Vec<(u64, BTreeMap<String, Vec<String>>)>,
    bookings: BTreeMap<u64, StoredBooking>,
    valid_token: Option<String>,
    scripted: VecDeque<ScriptedFailure>,
    raw_results: HashMap<String, Value>,
    calls: HashMap<String, usize>,
    last_params: HashMap<String, Vec<Value>>,
}

pub struct MockRemote {
    company: String,
    api_key: String,
    secret_key: String,
    state: Mutex<PlatformState>,
    login_calls: AtomicUsize,
    tokens_issued: AtomicU64,
    next_booking_id: AtomicU64,
    login_delay_ms: AtomicU64,
    reject_logins: AtomicBool,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            company: "lashstudio".to_string(),
            api_key: "plugin-api-key".to_string(),
            secret_key: "plugin-secret".to_string(),
            state: Mutex::new(PlatformState::default()),
            login_calls: AtomicUsize::new(0),
            tokens_issued: AtomicU64::new(0),
            next_booking_id: AtomicU64::new(100),
            login_delay_ms: AtomicU64::new(0),
            reject_logins: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> GatewayConfig {
        GatewayConfig::new(
            "mock://simplybook",
            self.company.clone(),
            self.api_key.clone(),
            self.secret_key.clone(),
        )
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn add_service(&self, service_id: u64, duration: Value) {
        self.state.lock().services.insert(service_id, duration);
    }

    pub fn add_timeslots(&self, provider_id: u64, date: &str, times: &[&str]) {
        let mut state = self.state.lock();
        let index = match state.providers.iter().position(|(id, _)| *id == provider_id) {
            Some(index) => index,
            None => {
                state.providers.push((provider_id, BTreeMap::new()));
                state.providers.len() - 1
            }
        };
        state.providers[index]
            .1
            .entry(date.to_string())
            .or_default()
            .extend(times.iter().map(|t| t.to_string()));
    }

    pub fn insert_booking(
        &self,
        id: u64,
        hash: &str,
        event_id: u64,
        unit_id: u64,
        start: &str,
        end: &str,
    ) {
        self.state.lock().bookings.insert(
            id,
            StoredBooking {
                id,
                hash: hash.to_string(),
                event_id,
                unit_id,
                start: start.to_string(),
                end: end.to_string(),
                client: json!({"name": "Seeded Client"}),
            },
        );
    }

    pub fn booking(&self, id: u64) -> Option<StoredBooking> {
        self.state.lock().bookings.get(&id).cloned()
    }

    // Result returned verbatim for `method`, bypassing the simulated platform.
    pub fn set_raw_result(&self, method: &str, result: Value) {
        self.state
            .lock()
            .raw_results
            .insert(method.to_string(), result);
    }

    // Server-side session expiry: the issued token stops being accepted.
    pub fn expire_token(&self) {
        self.state.lock().valid_token = None;
    }

    pub fn fail_next_call(&self, message: &str) {
        self.state
            .lock()
            .scripted
            .push_back(ScriptedFailure::Remote(message.to_string()));
    }

    pub fn fail_next_with_status(&self, status: u16) {
        self.state
            .lock()
            .scripted
            .push_back(ScriptedFailure::Status(status));
    }

    pub fn fail_next_with_timeout(&self) {
        self.state.lock().scripted.push_back(ScriptedFailure::Timeout);
    }

    pub fn set_login_delay(&self, delay_ms: u64) {
        self.login_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn reject_logins(&self, reject: bool) {
        self.reject_logins.store(reject, Ordering::SeqCst);
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn last_params(&self, method: &str) -> Option<Vec<Value>> {
        self.state.lock().last_params.get(method).cloned()
    }

    async fn handle_login(&self, request: &RpcRequest) -> RpcResponse {
        self.login_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.login_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let credentials_match = request.method == "getToken"
            && request.params.first() == Some(&json!(self.company))
            && request.params.get(1) == Some(&json!(self.api_key));
        if self.reject_logins.load(Ordering::SeqCst) || !credentials_match {
            return RpcResponse::failure(Some(-32600), "Invalid api key or company login");
        }

        let serial = self.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{}", serial);
        self.state.lock().valid_token = Some(token.clone());
        RpcResponse::success(json!(token))
    }

    fn handle_call(
        &self,
        session: Option<SessionHeaders<'_>>,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError> {
        let mut state = self.state.lock();
        let method = request.method.as_str();
        *state.calls.entry(method.to_string()).or_insert(0) += 1;
        state
            .last_params
            .insert(method.to_string(), request.params.clone());

        if let Some(failure) = state.scripted.pop_front() {
            return match failure {
                ScriptedFailure::Remote(message) => Ok(RpcResponse::failure(None, message)),
                ScriptedFailure::Status(status) => Err(TransportError::Status {
                    status,
                    message: "Unauthorized".to_string(),
                }),
                ScriptedFailure::Timeout => Err(TransportError::Timeout(15_000)),
            };
        }

        let authorized = match (&session, &state.valid_token) {
            (Some(headers), Some(valid)) => {
                headers.company == self.company && headers.token == valid.as_str()
            }
            _ => false,
        };
        if !authorized {
            return Ok(RpcResponse::failure(Some(-32600), "Token is invalid or expired"));
        }

        if let Some(raw) = state.raw_results.get(method) {
            return Ok(RpcResponse::success(raw.clone()));
        }

        let params = &request.params;
        let outcome = match method {
            "getEventList" => Ok(event_list(&state)),
            "getCartesianStartTimeMatrix" => start_time_matrix(&state, params),
            "book" => self.book(&mut state, params),
            "getBookingDetails" => self.booking_details(&state, params),
            "rescheduleBook" => self.reschedule(&mut state, params),
            other => Err(format!("Method not found: {}", other)),
        };

        Ok(match outcome {
            Ok(result) => RpcResponse::success(result),
            Err(message) => RpcResponse::failure(Some(-32000), message),
        })
    }

    fn book(&self, state: &mut PlatformState, params: &[Value]) -> Result<Value, String> {
        let service_id = arg_id(params, 0)?;
        let requested_provider = arg_id(params, 1)?;
        let date = arg_str(params, 2)?;
        let time = arg_str(params, 3)?;
        let client = params.get(4).cloned().unwrap_or(Value::Null);

        let platform: &PlatformState = state;
        let provider_id = platform
            .providers
            .iter()
            .filter(|(id, _)| requested_provider == 0 || *id == requested_provider)
            .find(|(id, grid)| {
                offers(grid, &date, &time) && !is_taken(platform, *id, &date, &time, None)
            })
            .map(|(id, _)| *id)
            .ok_or_else(|| "Selected time is not available".to_string())?;

        let start = parse_timestamp(&format!("{} {}", date, time))
            .ok_or_else(|| "Invalid start date/time".to_string())?;
        let end = start + ChronoDuration::minutes(service_minutes(state, service_id));

        let id = self.next_booking_id.fetch_add(1, Ordering::SeqCst);
        let booking = StoredBooking {
            id,
            hash: format!("h{:08x}", id * 2_654_435_761 % 0xffff_ffff),
            event_id: service_id,
            unit_id: provider_id,
            start: start.format(TIMESTAMP).to_string(),
            end: end.format(TIMESTAMP).to_string(),
            client,
        };
        let result = json!({
            "bookings": [{
                "id": booking.id.to_string(),
                "hash": booking.hash,
                "require_payment": false,
                "start_date_time": booking.start,
                "end_date_time": booking.end,
                "event_id": booking.event_id,
                "unit_id": booking.unit_id
            }],
            "require_payment": false
        });
        state.bookings.insert(id, booking);
        Ok(result)
    }

    fn booking_details(&self, state: &PlatformState, params: &[Value]) -> Result<Value, String> {
        let id = arg_id(params, 0)?;
        let sign = arg_str(params, 1)?;
        let booking = match state.bookings.get(&id) {
            Some(booking) => booking,
            None => return Ok(Value::Null),
        };
        self.verify_sign(booking, &sign)?;

        Ok(json!({
            "id": booking.id.to_string(),
            "event_id": booking.event_id.to_string(),
            "unit_id": booking.unit_id.to_string(),
            "start_date_time": booking.start,
            "end_date_time": booking.end,
            "client": booking.client,
            "is_confirmed": "1"
        }))
    }

    fn reschedule(&self, state: &mut PlatformState, params: &[Value]) -> Result<Value, String> {
        let id = arg_id(params, 0)?;
        let sign = arg_str(params, 1)?;
        let start_date = arg_str(params, 2)?;
        let start_time = arg_str(params, 3)?;
        let end_date = arg_str(params, 4)?;
        let end_time = arg_str(params, 5)?;

        let booking = state
            .bookings
            .get(&id)
            .ok_or_else(|| "Booking not found".to_string())?;
        self.verify_sign(booking, &sign)?;

        let unit_id = booking.unit_id;
        let free = state
            .providers
            .iter()
            .any(|(provider, grid)| *provider == unit_id && offers(grid, &start_date, &start_time))
            && !is_taken(state, unit_id, &start_date, &start_time, Some(id));
        if !free {
            return Err("Selected time is not available".to_string());
        }

        if let Some(booking) = state.bookings.get_mut(&id) {
            booking.start = format!("{} {}", start_date, start_time);
            booking.end = format!("{} {}", end_date, end_time);
        }
        Ok(json!(true))
    }

    fn verify_sign(&self, booking: &StoredBooking, sign: &str) -> Result<(), String> {
        let expected = booking_sign(&booking.id.to_string(), &booking.hash, &self.secret_key);
        if expected == sign {
            Ok(())
        } else {
            Err("Signature error".to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for MockRemote {
    async fn send(
        &self,
        endpoint: Endpoint,
        session: Option<SessionHeaders<'_>>,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError> {
        match endpoint {
            Endpoint::Login => Ok(self.handle_login(request).await),
            Endpoint::Api => self.handle_call(session, request),
        }
    }
}

fn event_list(state: &PlatformState) -> Value {
    let events: serde_json::Map<String, Value> = state
        .services
        .iter()
        .map(|(id, duration)| {
            (
                id.to_string(),
                json!({
                    "id": id.to_string(),
                    "name": format!("Service {}", id),
                    "duration": duration
                }),
            )
        })
        .collect();
    Value::Object(events)
}

fn start_time_matrix(state: &PlatformState, params: &[Value]) -> Result<Value, String> {
    let from = arg_str(params, 0)?;
    let to = arg_str(params, 1)?;
    let unit = arg_id(params, 3)?;
    if from.len() != 19 || to.len() != 19 {
        return Err("Invalid date range".to_string());
    }
    let date = &from[..10];
    let (from_time, to_time) = (&from[11..], &to[11..]);

    let entries: Vec<Value> = state
        .providers
        .iter()
        .filter(|(id, _)| unit == 0 || *id == unit)
        .map(|(id, grid)| {
            let times: Vec<&String> = grid
                .get(date)
                .into_iter()
                .flatten()
                .filter(|t| t.as_str() >= from_time && t.as_str() <= to_time)
                .filter(|t| !is_taken(state, *id, date, t, None))
                .collect();
            json!({"provider_id": id, "timeslots": {date: times}})
        })
        .collect();
    Ok(Value::Array(entries))
}

fn offers(grid: &BTreeMap<String, Vec<String>>, date: &str, time: &str) -> bool {
    grid.get(date)
        .map(|times| times.iter().any(|t| t == time))
        .unwrap_or(false)
}

// A start time is taken when an existing booking of the provider covers it.
fn is_taken(
    state: &PlatformState,
    unit_id: u64,
    date: &str,
    time: &str,
    exclude: Option<u64>,
) -> bool {
    let candidate = match parse_timestamp(&format!("{} {}", date, time)) {
        Some(candidate) => candidate,
        None => return false,
    };
    state
        .bookings
        .values()
        .filter(|b| b.unit_id == unit_id && Some(b.id) != exclude)
        .filter_map(|b| Some((parse_timestamp(&b.start)?, parse_timestamp(&b.end)?)))
        .any(|(start, end)| start <= candidate && candidate < end)
}

fn service_minutes(state: &PlatformState, service_id: u64) -> i64 {
    let minutes = match state.services.get(&service_id) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    };
    minutes
        .map(|m| m.round() as i64)
        .unwrap_or(DEFAULT_DURATION_MINUTES)
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP).ok()
}

fn arg_str(params: &[Value], index: usize) -> Result<String, String> {
    params
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("Parameter {} must be a string", index))
}

fn arg_id(params: &[Value], index: usize) -> Result<u64, String> {
    params
        .get(index)
        .and_then(id_from_value)
        .ok_or_else(|| format!("Parameter {} must be an id", index))
}
