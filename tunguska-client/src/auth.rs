//! Auth code acquisition.
//!
//! Both transports authenticate with a short-lived OAuth auth code.
//! Codes are single use, so the client asks a provider for a fresh one
//! on every login attempt rather than caching.

use crate::error::ClientError;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces a fresh auth code for each login attempt.
#[async_trait]
pub trait AuthCodeProvider: Send + Sync {
    async fn auth_code(&self) -> Result<String, ClientError>;
}

/// A provider returning a fixed code, for tests and tooling that
/// already hold one.
pub struct StaticAuthCode {
    code: String,
}

impl StaticAuthCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

#[async_trait]
impl AuthCodeProvider for StaticAuthCode {
    async fn auth_code(&self) -> Result<String, ClientError> {
        Ok(self.code.clone())
    }
}

/// A provider wrapping a closure, for callers that fetch codes through
/// their own machinery.
pub struct AuthCodeFn<F> {
    f: F,
}

impl<F> AuthCodeFn<F>
where
    F: Fn() -> Result<String, ClientError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> AuthCodeProvider for AuthCodeFn<F>
where
    F: Fn() -> Result<String, ClientError> + Send + Sync,
{
    async fn auth_code(&self) -> Result<String, ClientError> {
        (self.f)()
    }
}

/// Callback invoked when an automatic relogin attempt fails. Direct
/// `login()` callers get the error as a return value instead.
pub type LoginFailureHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;
