//! HTTP JSON-RPC client for the companion gateway.
//!
//! The gateway speaks JSON-RPC 2.0 over HTTPS. A session token obtained
//! at login rides along as a request header; the queue and relogin
//! behavior mirrors the socket client, with the session-expired RPC
//! error playing the role of the stale-session packet error.

use crate::auth::{AuthCodeProvider, LoginFailureHandler};
use crate::error::ClientError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Production gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "https://sparta-gw-bf1.battlelog.com/jsonrpc/pc/api";

/// Default locale sent with the login call.
pub const DEFAULT_LOCALE: &str = "zh-tw";

/// Game identifier merged into every request's params.
const GAME_ID: &str = "tunguska";

/// Session token request header.
const SESSION_HEADER: &str = "X-GatewaySession";

/// JSON-RPC error code signalling an expired session.
const SESSION_EXPIRED_CODE: i64 = -32501;

/// Gateway transport configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway endpoint URL.
    pub url: String,
    /// Locale sent with the login call.
    pub locale: String,
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct EnvIdResult {
    #[serde(rename = "sessionId")]
    session_id: String,
}

struct PendingRpc {
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, ClientError>>,
    /// Posted and awaiting its response. Guards against a concurrent
    /// replay resubmitting the same call.
    in_flight: bool,
}

struct State {
    logging_in: bool,
    /// Session expiry arrived while a login was still running; that
    /// login reruns once before releasing the flag.
    relogin_requested: bool,
    session_id: Option<String>,
    /// Calls awaiting a session, keyed by arrival order.
    queue: BTreeMap<u64, PendingRpc>,
    next_token: u64,
}

struct Inner {
    config: GatewayConfig,
    http: reqwest::Client,
    provider: Arc<dyn AuthCodeProvider>,
    on_login_failure: RwLock<Option<LoginFailureHandler>>,
    ready: AtomicBool,
    state: Mutex<State>,
}

/// Client for the companion gateway.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, provider: Arc<dyn AuthCodeProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http: reqwest::Client::new(),
                provider,
                on_login_failure: RwLock::new(None),
                ready: AtomicBool::new(false),
                state: Mutex::new(State {
                    logging_in: false,
                    relogin_requested: false,
                    session_id: None,
                    queue: BTreeMap::new(),
                    next_token: 0,
                }),
            }),
        }
    }

    /// Installs a callback for relogin attempts that fail. Direct
    /// `login()` callers get the error as a return value instead.
    pub fn set_login_failure_handler(&self, handler: LoginFailureHandler) {
        if let Ok(mut slot) = self.inner.on_login_failure.write() {
            *slot = Some(handler);
        }
    }

    /// Returns whether a session token is held.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Exchanges a fresh auth code for a session token, then replays
    /// any queued calls.
    pub async fn login(&self) -> Result<(), ClientError> {
        if !self.inner.claim_login(false).await {
            return Err(ClientError::LoginInProgress);
        }
        let result = self.inner.login().await;
        if self.inner.release_login().await {
            // A session expiry landed mid-login; run the follow-up
            // round in the background.
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.login_loop().await });
        }
        result
    }

    /// Calls a gateway method. Before login the call is queued and
    /// resolves once a session exists and the replay goes through.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Value,
    ) -> Result<Value, ClientError> {
        let method = method.into();
        let (tx, rx) = oneshot::channel();
        let token = {
            let mut state = self.inner.state.lock().await;
            let token = state.next_token;
            state.next_token += 1;
            state.queue.insert(
                token,
                PendingRpc {
                    method,
                    params,
                    responder: tx,
                    in_flight: false,
                },
            );
            token
        };

        if self.inner.ready.load(Ordering::SeqCst) {
            self.inner.dispatch(token).await;
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Drops the session and cancels queued calls.
    pub async fn close(&self) {
        self.inner.ready.store(false, Ordering::SeqCst);
        let cancelled = {
            let mut state = self.inner.state.lock().await;
            state.session_id = None;
            std::mem::take(&mut state.queue)
        };
        for (_, call) in cancelled {
            let _ = call.responder.send(Err(ClientError::ConnectionClosed));
        }
    }
}

impl Inner {
    async fn login(self: &Arc<Self>) -> Result<(), ClientError> {
        self.ready.store(false, Ordering::SeqCst);
        self.state.lock().await.session_id = None;

        let code = self.provider.auth_code().await?;
        let params = json!({ "authCode": code, "locale": self.config.locale });
        let result = self
            .raw_request("Authentication.getEnvIdViaAuthCode", params, None)
            .await?;
        let env: EnvIdResult = serde_json::from_value(result)?;

        self.state.lock().await.session_id = Some(env.session_id);
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("gateway session established");
        self.replay().await;
        Ok(())
    }

    /// Runs a queued call without removing it from the queue. Session
    /// expiry leaves it queued and starts a background relogin;
    /// anything else settles it.
    async fn dispatch(self: &Arc<Self>, token: u64) {
        let (method, params, session) = {
            let mut state = self.state.lock().await;
            let Some(call) = state.queue.get_mut(&token) else {
                return;
            };
            if call.in_flight {
                return;
            }
            call.in_flight = true;
            let method = call.method.clone();
            let params = call.params.clone();
            (method, params, state.session_id.clone())
        };

        let result = self.raw_request(&method, params, session.as_deref()).await;
        match result {
            Err(ClientError::Gateway { code, .. }) if code == SESSION_EXPIRED_CODE => {
                tracing::debug!(token, "gateway session expired, holding call for relogin");
                {
                    let mut state = self.state.lock().await;
                    if let Some(call) = state.queue.get_mut(&token) {
                        call.in_flight = false;
                    }
                }
                self.ready.store(false, Ordering::SeqCst);
                self.begin_relogin();
            }
            other => self.settle(token, other).await,
        }
    }

    async fn settle(self: &Arc<Self>, token: u64, result: Result<Value, ClientError>) {
        let call = self.state.lock().await.queue.remove(&token);
        if let Some(call) = call {
            let _ = call.responder.send(result);
        }
    }

    /// Requests a relogin. Coalesces with one already underway: the
    /// running login picks the request up and reruns before releasing
    /// the flag, so an expiry observed mid-login is never dropped.
    /// Failures go to the login failure handler, not to callers.
    fn begin_relogin(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move {
            if inner.claim_login(true).await {
                inner.login_loop().await;
            }
        });
    }

    /// Takes the login flag. When a login is already running, returns
    /// false; with `rerun_if_busy` the running login is asked to go
    /// another round instead.
    async fn claim_login(&self, rerun_if_busy: bool) -> bool {
        let mut state = self.state.lock().await;
        if state.logging_in {
            if rerun_if_busy {
                state.relogin_requested = true;
            }
            false
        } else {
            state.logging_in = true;
            true
        }
    }

    /// Releases the login flag. Returns true when another round was
    /// requested while this one ran; the flag stays held for it.
    async fn release_login(&self) -> bool {
        let mut state = self.state.lock().await;
        if std::mem::take(&mut state.relogin_requested) {
            true
        } else {
            state.logging_in = false;
            false
        }
    }

    /// Runs login rounds until none is pending. The caller must hold
    /// the login flag.
    async fn login_loop(self: &Arc<Self>) {
        loop {
            if let Err(e) = self.login().await {
                tracing::warn!(error = %e, "automatic gateway relogin failed");
                let handler = match self.on_login_failure.read() {
                    Ok(slot) => slot.clone(),
                    Err(_) => None,
                };
                if let Some(handler) = handler {
                    handler(&e);
                }
            }
            if !self.release_login().await {
                break;
            }
        }
    }

    /// Reruns every queued call in arrival order.
    async fn replay(self: &Arc<Self>) {
        let tokens: Vec<u64> = self.state.lock().await.queue.keys().copied().collect();
        if tokens.is_empty() {
            return;
        }
        tracing::debug!(count = tokens.len(), "replaying queued gateway calls");
        for token in tokens {
            self.dispatch(token).await;
        }
    }

    /// Posts one JSON-RPC request. Transport failures come back as the
    /// transient [`ClientError::Network`] kind; a JSON-RPC error object
    /// becomes [`ClientError::Gateway`].
    async fn raw_request(
        &self,
        method: &str,
        mut params: Value,
        session: Option<&str>,
    ) -> Result<Value, ClientError> {
        if let Value::Object(map) = &mut params {
            map.insert("game".to_string(), Value::String(GAME_ID.to_string()));
        }
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": Uuid::new_v4().to_string(),
        });

        let mut request = self.http.post(&self.config.url).json(&body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }

        tracing::debug!(method, "gateway request");
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let rpc: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if let Some(error) = rpc.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(ClientError::Gateway { code, message });
        }
        match rpc.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(ClientError::InvalidResponse(
                "response has neither result nor error".to_string(),
            )),
        }
    }
}
