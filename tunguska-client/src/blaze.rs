//! High-level socket client with transparent session management.
//!
//! Calls made before login (or while a relogin is underway) are held in
//! an ordered queue and replayed once a session exists. A response
//! carrying the session-expiry error does not surface to the caller:
//! the call stays queued, a relogin starts in the background, and the
//! call is resubmitted on the new connection.

use crate::auth::{AuthCodeProvider, LoginFailureHandler};
use crate::error::ClientError;
use crate::socket::{BlazeSocket, SocketConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, oneshot, Mutex};
use tunguska_protocol::{BlazeStruct, Packet, Tag, Value};

struct PendingCall {
    method: String,
    data: BlazeStruct,
    responder: oneshot::Sender<Result<Packet, ClientError>>,
    /// Submitted on the current connection and awaiting its response.
    /// Guards against a concurrent replay resubmitting the same call.
    in_flight: bool,
}

struct State {
    logging_in: bool,
    /// Session expiry arrived while a login was still running; that
    /// login reruns once before releasing the flag.
    relogin_requested: bool,
    socket: Option<Arc<BlazeSocket>>,
    /// Calls awaiting a session, keyed by arrival order.
    queue: BTreeMap<u64, PendingCall>,
    next_token: u64,
}

struct Inner {
    config: SocketConfig,
    provider: Arc<dyn AuthCodeProvider>,
    on_login_failure: RwLock<Option<LoginFailureHandler>>,
    ready: AtomicBool,
    state: Mutex<State>,
}

/// Client for the backend socket endpoint.
#[derive(Clone)]
pub struct BlazeClient {
    inner: Arc<Inner>,
}

impl BlazeClient {
    pub fn new(config: SocketConfig, provider: Arc<dyn AuthCodeProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                on_login_failure: RwLock::new(None),
                ready: AtomicBool::new(false),
                state: Mutex::new(State {
                    logging_in: false,
                    relogin_requested: false,
                    socket: None,
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

    /// Returns whether a session is established.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Subscribes to unsolicited notification packets on the current
    /// connection.
    pub async fn subscribe_messages(&self) -> Result<broadcast::Receiver<Packet>, ClientError> {
        let state = self.inner.state.lock().await;
        match &state.socket {
            Some(socket) => Ok(socket.subscribe_messages()),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Connects and authenticates, then replays any queued calls.
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

    /// Sends a command. Before login the call is queued and resolves
    /// once a session exists and the replay goes through.
    pub async fn send(
        &self,
        method: impl Into<String>,
        data: BlazeStruct,
    ) -> Result<Packet, ClientError> {
        let method = method.into();
        let (tx, rx) = oneshot::channel();
        let token = {
            let mut state = self.inner.state.lock().await;
            let token = state.next_token;
            state.next_token += 1;
            state.queue.insert(
                token,
                PendingCall {
                    method,
                    data,
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

    /// Tears down the connection and cancels queued calls.
    pub async fn close(&self) {
        self.inner.ready.store(false, Ordering::SeqCst);
        let (socket, cancelled) = {
            let mut state = self.inner.state.lock().await;
            let queue = std::mem::take(&mut state.queue);
            (state.socket.take(), queue)
        };
        if let Some(socket) = socket {
            socket.close().await;
        }
        for (_, call) in cancelled {
            let _ = call.responder.send(Err(ClientError::ConnectionClosed));
        }
    }
}

impl Inner {
    /// Tears down any previous connection, authenticates on a fresh
    /// one and replays the queue.
    async fn login(self: &Arc<Self>) -> Result<(), ClientError> {
        self.ready.store(false, Ordering::SeqCst);
        let old = self.state.lock().await.socket.take();
        if let Some(old) = old {
            old.close().await;
        }

        let socket = Arc::new(BlazeSocket::connect(&self.config).await?);
        let code = self.provider.auth_code().await?;

        let data = BlazeStruct::new()
            .with(Tag::new("AUTH")?, Value::Text(code))
            .with(Tag::new("EXTB")?, Value::Blob(Vec::new()))
            .with(Tag::new("EXTI")?, Value::Int(0));
        socket
            .send(Packet::command("Authentication.login", data))
            .await?;

        self.state.lock().await.socket = Some(socket);
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("session established");
        self.replay().await;
        Ok(())
    }

    /// Submits a queued call and resolves its response inline.
    async fn dispatch(self: &Arc<Self>, token: u64) {
        if let Some(rx) = self.submit_call(token).await {
            self.resolve(token, rx).await;
        }
    }

    /// Submits a queued call on the current socket without removing it
    /// from the queue. Returns None when the call was settled with a
    /// submission error, or is already in flight.
    async fn submit_call(self: &Arc<Self>, token: u64) -> Option<oneshot::Receiver<Packet>> {
        let (packet, socket) = {
            let mut state = self.state.lock().await;
            let call = state.queue.get_mut(&token)?;
            if call.in_flight {
                return None;
            }
            call.in_flight = true;
            let packet = Packet::command(call.method.clone(), call.data.clone());
            (packet, state.socket.clone())
        };
        let Some(socket) = socket else {
            self.settle(token, Err(ClientError::NotConnected)).await;
            return None;
        };
        match socket.submit(packet).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                self.settle(token, Err(e)).await;
                None
            }
        }
    }

    /// Awaits a submitted call's response. Session expiry leaves the
    /// call queued and starts a background relogin; anything else
    /// settles it.
    async fn resolve(self: &Arc<Self>, token: u64, rx: oneshot::Receiver<Packet>) {
        let response = match rx.await {
            Ok(response) => response,
            Err(_) => {
                self.settle(token, Err(ClientError::ConnectionClosed)).await;
                return;
            }
        };
        match response.into_result() {
            Ok(packet) => self.settle(token, Ok(packet)).await,
            Err(err) if err.is_authentication_required() => {
                tracing::debug!(token, "session expired, holding call for relogin");
                {
                    let mut state = self.state.lock().await;
                    if let Some(call) = state.queue.get_mut(&token) {
                        call.in_flight = false;
                    }
                }
                self.ready.store(false, Ordering::SeqCst);
                self.begin_relogin();
            }
            Err(err) => self.settle(token, Err(ClientError::Blaze(err))).await,
        }
    }

    async fn settle(self: &Arc<Self>, token: u64, result: Result<Packet, ClientError>) {
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
                tracing::warn!(error = %e, "automatic relogin failed");
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

    /// Resubmits every queued call in arrival order. Submission is
    /// sequential so write order matches arrival order; responses are
    /// awaited concurrently.
    async fn replay(self: &Arc<Self>) {
        let tokens: Vec<u64> = self.state.lock().await.queue.keys().copied().collect();
        if tokens.is_empty() {
            return;
        }
        tracing::debug!(count = tokens.len(), "replaying queued calls");
        for token in tokens {
            if let Some(rx) = self.submit_call(token).await {
                let inner = self.clone();
                tokio::spawn(async move {
                    inner.resolve(token, rx).await;
                });
            }
        }
    }
}
