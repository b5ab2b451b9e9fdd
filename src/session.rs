// Session manager: owns the bearer token and deduplicates concurrent logins

use crate::error::GatewayError;
use crate::transport::{Endpoint, RpcRequest, RpcTransport};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const LOGIN_METHOD: &str = "getToken";
const LOGIN_REQUEST_ID: u64 = 1;

type LoginFuture = Shared<BoxFuture<'static, Result<String, GatewayError>>>;

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    // In-flight login shared by every caller that found no token
    pending: Option<LoginFuture>,
    // Bumped by reset() so a login started before it cannot publish its token
    generation: u64,
}

pub struct SessionManager {
    transport: Arc<dyn RpcTransport>,
    company: String,
    api_key: String,
    state: Arc<Mutex<SessionState>>,
    logins: Arc<AtomicUsize>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        company: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            company: company.into(),
            api_key: api_key.into(),
            state: Arc::new(Mutex::new(SessionState::default())),
            logins: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    // Returns the held token, or waits for the single in-flight login, starting
    // one if nobody has yet.
    pub async fn ensure_token(&self) -> Result<String, GatewayError> {
        let login = {
            let mut state = self.state.lock();
            if let Some(token) = &state.token {
                return Ok(token.clone());
            }
            match &state.pending {
                Some(login) => {
                    debug!("Waiting for in-flight login");
                    login.clone()
                }
                None => {
                    let login = self.start_login(state.generation);
                    state.pending = Some(login.clone());
                    login
                }
            }
        };
        login.await
    }

    // Drops `stale` if it is still the held token. A token already replaced by a
    // concurrent re-login is left alone.
    pub fn invalidate(&self, stale: &str) {
        let mut state = self.state.lock();
        if state.token.as_deref() == Some(stale) {
            state.token = None;
        }
    }

    // Forget the token and any in-flight login.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.token = None;
        state.pending = None;
        state.generation += 1;
    }

    pub fn has_token(&self) -> bool {
        self.state.lock().token.is_some()
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn start_login(&self, generation: u64) -> LoginFuture {
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let logins = Arc::clone(&self.logins);
        let company = self.company.clone();
        let api_key = self.api_key.clone();

        async move {
            logins.fetch_add(1, Ordering::SeqCst);
            let result = request_token(transport.as_ref(), &company, &api_key).await;

            // Publish before any waiter observes the result.
            {
                let mut state = state.lock();
                if state.generation == generation {
                    state.pending = None;
                    if let Ok(token) = &result {
                        state.token = Some(token.clone());
                    }
                }
            }

            match &result {
                Ok(_) => info!(company = %company, "Obtained session token"),
                Err(e) => info!(company = %company, error = %e, "Login failed"),
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn request_token(
    transport: &dyn RpcTransport,
    company: &str,
    api_key: &str,
) -> Result<String, GatewayError> {
    let request = RpcRequest::new(
        LOGIN_METHOD,
        vec![json!(company), json!(api_key)],
        LOGIN_REQUEST_ID,
    );

    let response = transport
        .send(Endpoint::Login, None, &request)
        .await
        .map_err(|e| GatewayError::AuthenticationFailed(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(GatewayError::AuthenticationFailed(
            error.message.unwrap_or_else(|| "Login failed".to_string()),
        ));
    }

    match response.result {
        Some(Value::String(token)) if !token.is_empty() => Ok(token),
        _ => Err(GatewayError::AuthenticationFailed(
            "login returned no token".to_string(),
        )),
    }
}
