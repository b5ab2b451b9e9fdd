// RPC gateway: authenticated JSON-RPC calls with a single re-login retry

use crate::error::GatewayError;
use crate::session::SessionManager;
use crate::transport::{
    Endpoint, RpcErrorObject, RpcRequest, RpcTransport, SessionHeaders, TransportError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct GatewayStats {
    pub calls_sent: AtomicUsize,
    pub calls_succeeded: AtomicUsize,
    pub calls_failed: AtomicUsize,
    pub token_retries: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GatewayStatsReport {
    pub calls_sent: usize,
    pub calls_succeeded: usize,
    pub calls_failed: usize,
    pub token_retries: usize,
    pub logins: usize,
    pub duration_refreshes: usize,
}

// Why a single attempt failed
#[derive(Debug)]
enum CallFailure {
    Transport(TransportError),
    Remote(RpcErrorObject),
}

impl CallFailure {
    // Token rejected by the platform. HTTP 401/403 is authoritative; the JSON-RPC
    // error object carries no dedicated code for it, so its message is inspected.
    fn is_token_rejection(&self) -> bool {
        match self {
            CallFailure::Transport(err) => err.is_unauthorized(),
            CallFailure::Remote(err) => err
                .message
                .as_deref()
                .map(looks_like_token_error)
                .unwrap_or(false),
        }
    }

    fn message(&self) -> String {
        match self {
            CallFailure::Transport(err) => err.to_string(),
            CallFailure::Remote(err) => err
                .message
                .clone()
                .unwrap_or_else(|| "RPC error".to_string()),
        }
    }
}

pub(crate) fn looks_like_token_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("token") || message.contains("unauthorized")
}

pub struct RpcGateway {
    transport: Arc<dyn RpcTransport>,
    session: Arc<SessionManager>,
    next_id: AtomicU64,
    stats: GatewayStats,
}

impl RpcGateway {
    pub fn new(transport: Arc<dyn RpcTransport>, session: Arc<SessionManager>) -> Self {
        Self {
            transport,
            session,
            next_id: AtomicU64::new(1),
            stats: GatewayStats::default(),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // Calls `method`. A token rejection invalidates the session and the call is
    // repeated once with a fresh token; every other failure is returned as is.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, GatewayError> {
        let token = self.session.ensure_token().await?;

        let failure = match self.attempt(method, &params, &token).await {
            Ok(result) => return Ok(self.succeeded(result)),
            Err(failure) => failure,
        };

        if !failure.is_token_rejection() {
            return Err(self.failed(method, failure));
        }

        warn!(method, "Session token rejected, logging in again");
        self.stats.token_retries.fetch_add(1, Ordering::SeqCst);
        self.session.invalidate(&token);
        let token = self.session.ensure_token().await?;

        match self.attempt(method, &params, &token).await {
            Ok(result) => Ok(self.succeeded(result)),
            Err(failure) => Err(self.failed(method, failure)),
        }
    }

    // Like call, decoding the result into `T`. A shape mismatch is an upstream fault.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, GatewayError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            GatewayError::MalformedUpstreamData(format!("unexpected {} result: {}", method, e))
        })
    }

    pub fn stats(&self) -> GatewayStatsReport {
        GatewayStatsReport {
            calls_sent: self.stats.calls_sent.load(Ordering::SeqCst),
            calls_succeeded: self.stats.calls_succeeded.load(Ordering::SeqCst),
            calls_failed: self.stats.calls_failed.load(Ordering::SeqCst),
            token_retries: self.stats.token_retries.load(Ordering::SeqCst),
            logins: self.session.login_count(),
            duration_refreshes: 0,
        }
    }

    async fn attempt(
        &self,
        method: &str,
        params: &[Value],
        token: &str,
    ) -> Result<Value, CallFailure> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(method, params.to_vec(), id);
        let headers = SessionHeaders {
            company: self.session.company(),
            token,
        };

        debug!(method, id, "Sending RPC call");
        self.stats.calls_sent.fetch_add(1, Ordering::SeqCst);

        let response = self
            .transport
            .send(Endpoint::Api, Some(headers), &request)
            .await
            .map_err(CallFailure::Transport)?;

        if let Some(error) = response.error {
            return Err(CallFailure::Remote(error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    fn succeeded(&self, result: Value) -> Value {
        self.stats.calls_succeeded.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn failed(&self, method: &str, failure: CallFailure) -> GatewayError {
        self.stats.calls_failed.fetch_add(1, Ordering::SeqCst);
        let message = failure.message();
        debug!(method, error = %message, "RPC call failed");
        GatewayError::rpc(method, message)
    }
}
