//! Persistent socket transport.
//!
//! A [`BlazeSocket`] owns one TCP/TLS connection to the backend. Writes
//! carry a correlation id assigned at send time; a background read task
//! reassembles inbound packets and routes responses to their waiting
//! callers, notifications to a broadcast channel. A second background
//! task writes the keepalive frame on a fixed interval so the backend
//! does not drop the session as idle.

use crate::error::ClientError;
use crate::stream::SocketStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tunguska_protocol::{
    Packet, PacketAssembler, PacketType, KEEPALIVE_FRAME, PACKET_HEADER_SIZE,
};

/// Production backend host.
pub const DEFAULT_HOST: &str = "diceprodblapp-08.ea.com";

/// Production backend port.
pub const DEFAULT_PORT: u16 = 10363;

/// Interval between keepalive frames.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Read buffer size for socket reads (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default capacity for the notification broadcast channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Socket transport configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Backend hostname.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Enable TLS for the connection.
    pub use_tls: bool,
    /// Skip server certificate verification. Defaults to true since
    /// the backend's chain is not publicly rooted.
    pub insecure: bool,
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, system roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Server name for SNI (defaults to the hostname).
    pub server_name: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Interval between keepalive frames.
    pub keepalive_interval: Duration,
}

impl SocketConfig {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            insecure: true,
            ca_cert_path: None,
            server_name: None,
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_plain_tcp(mut self) -> Self {
        self.use_tls = false;
        self
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self.insecure = false;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the socket handle and its background tasks.
struct SocketShared {
    /// Write half of the stream (for sending requests).
    writer: Mutex<Option<WriteHalf<SocketStream>>>,
    /// Pending requests keyed by correlation id.
    pending: Mutex<HashMap<u16, oneshot::Sender<Packet>>>,
    /// Next correlation id, wrapping through 1..=65535 (0 is reserved
    /// for unassigned packets).
    next_id: Mutex<u16>,
    /// Is the connection established?
    connected: AtomicBool,
    /// Broadcast channel for unsolicited notification packets.
    messages: broadcast::Sender<Packet>,
}

/// A connection to the backend socket endpoint.
pub struct BlazeSocket {
    shared: Arc<SocketShared>,
    read_task: JoinHandle<()>,
    keepalive_task: JoinHandle<()>,
}

impl BlazeSocket {
    /// Connects to the backend and starts the read and keepalive tasks.
    pub async fn connect(config: &SocketConfig) -> Result<Self, ClientError> {
        let stream = SocketStream::connect(config).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let shared = Arc::new(SocketShared {
            writer: Mutex::new(Some(write_half)),
            pending: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
            connected: AtomicBool::new(true),
            messages,
        });

        let read_task = tokio::spawn(read_loop(shared.clone(), read_half));
        let keepalive_task = tokio::spawn(keepalive_loop(
            shared.clone(),
            config.keepalive_interval,
        ));

        Ok(Self {
            shared,
            read_task,
            keepalive_task,
        })
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Subscribes to unsolicited notification packets.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Packet> {
        self.shared.messages.subscribe()
    }

    /// Assigns a correlation id, registers the response slot and writes
    /// the packet. The returned receiver resolves when the matching
    /// response arrives. Splitting submission from awaiting lets
    /// callers control write ordering across several requests.
    pub async fn submit(
        &self,
        mut packet: Packet,
    ) -> Result<oneshot::Receiver<Packet>, ClientError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let id = {
            let mut next = self.shared.next_id.lock().await;
            let id = *next;
            *next = if id == u16::MAX { 1 } else { id + 1 };
            id
        };
        packet.id = id;
        let encoded = packet.encode()?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, tx);

        let write_result = {
            let mut guard = self.shared.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => writer.write_all(&encoded).await.map_err(ClientError::Io),
                None => Err(ClientError::NotConnected),
            }
        };
        if let Err(e) = write_result {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        tracing::debug!(id, method = %packet.method, "request sent");
        Ok(rx)
    }

    /// Sends a command and waits for its response, resolving an
    /// application error carried in the payload.
    pub async fn send(&self, packet: Packet) -> Result<Packet, ClientError> {
        let rx = self.submit(packet).await?;
        let response = rx.await.map_err(|_| ClientError::ConnectionClosed)?;
        Ok(response.into_result()?)
    }

    /// Closes the connection and cancels all pending requests.
    pub async fn close(&self) {
        tracing::debug!("closing socket");
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.shared.pending.lock().await.clear();
        self.read_task.abort();
        self.keepalive_task.abort();
    }
}

impl Drop for BlazeSocket {
    fn drop(&mut self) {
        self.read_task.abort();
        self.keepalive_task.abort();
    }
}

/// Reads and dispatches inbound packets until the stream closes.
async fn read_loop(shared: Arc<SocketShared>, mut reader: ReadHalf<SocketStream>) {
    let mut assembler = PacketAssembler::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("connection closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "read failed");
                break;
            }
        };

        // A read may coalesce several packets; slice whole ones off the
        // front so each feed carries at most one.
        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let mut feed = chunk;
            if assembler.is_idle() && chunk.len() >= PACKET_HEADER_SIZE {
                match Packet::declared_payload_length(chunk) {
                    Ok(payload_length) => {
                        let framed = PACKET_HEADER_SIZE + payload_length;
                        if chunk.len() > framed {
                            feed = &chunk[..framed];
                        }
                    }
                    Err(_) => {}
                }
            }
            chunk = &chunk[feed.len()..];

            match assembler.push(feed) {
                Ok(Some(packet)) => dispatch(&shared, packet).await,
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "discarding undecodable packet"),
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    // Dropping the senders resolves every waiting caller with an error.
    shared.pending.lock().await.clear();
}

async fn dispatch(shared: &Arc<SocketShared>, packet: Packet) {
    match packet.packet_type {
        PacketType::Result => {
            if let Some(tx) = shared.pending.lock().await.remove(&packet.id) {
                tracing::debug!(id = packet.id, method = %packet.method, "response");
                let _ = tx.send(packet);
            } else {
                tracing::debug!(id = packet.id, "response with no pending request");
            }
        }
        PacketType::ReceiveMessage => {
            tracing::debug!(method = %packet.method, "notification");
            // Ignore errors (no subscribers).
            let _ = shared.messages.send(packet);
        }
        PacketType::ReceiveKeepAlive | PacketType::SendKeepAlive => {
            tracing::trace!("keepalive received");
        }
        PacketType::SendCommand => {
            tracing::warn!(method = %packet.method, "unexpected command from server");
        }
    }
}

/// Writes the keepalive frame on a fixed interval.
async fn keepalive_loop(shared: Arc<SocketShared>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // the first tick fires immediately

    loop {
        interval.tick().await;
        if !shared.connected.load(Ordering::SeqCst) {
            break;
        }
        let mut guard = shared.writer.lock().await;
        let Some(writer) = guard.as_mut() else { break };
        if let Err(e) = writer.write_all(&KEEPALIVE_FRAME).await {
            tracing::debug!(error = %e, "keepalive write failed");
            break;
        }
        tracing::trace!("keepalive sent");
    }
}
