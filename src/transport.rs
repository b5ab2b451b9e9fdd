// JSON-RPC 2.0 wire envelope and the HTTP transport that carries it

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),
}

impl TransportError {
    // HTTP-level token rejection. Preferred over inspecting message text.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Status { status: 401 | 403, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    // `{base}/login`, unauthenticated, only serves getToken
    Login,
    // `{base}/`, requires session headers
    Api,
}

// Headers attached to every authenticated call
#[derive(Debug, Clone)]
pub struct SessionHeaders<'a> {
    pub company: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: Some(message.into()),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

// Seam between the gateway and the wire. The gateway owns retries and sessions,
// the transport only moves one request and its response.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(
        &self,
        endpoint: Endpoint,
        session: Option<SessionHeaders<'_>>,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        match endpoint {
            Endpoint::Login => format!("{}/login", self.base_url),
            Endpoint::Api => format!("{}/", self.base_url),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout.as_millis() as u64)
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        session: Option<SessionHeaders<'_>>,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError> {
        let mut builder = self.http.post(self.url(endpoint)).json(request);
        if let Some(session) = session {
            builder = builder
                .header("X-Company-Login", session.company)
                .header("X-Token", session.token);
        }

        let res = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = res.status();
        let body = res.text().await.map_err(|e| self.map_send_error(e))?;

        // A JSON-RPC error body is more specific than the status line, keep it when present.
        match serde_json::from_str::<RpcResponse>(&body) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => Ok(parsed),
            Ok(_) => Err(status_error(status, &body)),
            Err(_) if !status.is_success() => Err(status_error(status, &body)),
            Err(e) => Err(TransportError::Decode(e.to_string())),
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> TransportError {
    let message = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());
    TransportError::Status {
        status: status.as_u16(),
        message,
    }
}
