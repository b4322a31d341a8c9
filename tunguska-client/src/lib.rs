//! # tunguska-client
//!
//! Async clients for the backend's two transports:
//! - [`BlazeClient`]: a persistent TCP/TLS socket speaking the tagged
//!   binary protocol, with request correlation, keepalives and a login
//!   queue that replays calls across reconnects
//! - [`GatewayClient`]: the companion gateway's JSON-RPC endpoint over
//!   HTTPS, with the same queue and transparent-relogin behavior
//!
//! Both authenticate with single-use auth codes obtained from an
//! [`AuthCodeProvider`] on every login attempt.

pub mod auth;
pub mod blaze;
pub mod error;
pub mod gateway;
pub mod socket;
pub mod stream;
pub mod tls;

pub use auth::{AuthCodeFn, AuthCodeProvider, LoginFailureHandler, StaticAuthCode};
pub use blaze::BlazeClient;
pub use error::ClientError;
pub use gateway::{GatewayClient, GatewayConfig, DEFAULT_GATEWAY_URL};
pub use socket::{BlazeSocket, SocketConfig};
pub use stream::SocketStream;
