//! Protocol error types.

use crate::value::ValueKind;
use thiserror::Error;

/// Errors produced while encoding or decoding the wire format.
///
/// A decode error is fatal to the packet being decoded but must never
/// corrupt surrounding state (the assembler resets to idle).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated input: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown value type tag: {0:#04x}")]
    UnknownValueType(u8),

    #[error("unknown packet type byte: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("integer exceeds the signed 64-bit range")]
    IntegerOverflow,

    #[error("invalid wire length: {0}")]
    InvalidLength(i64),

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("tag {0:?} is not representable in the 6-bit alphabet")]
    InvalidTag(String),

    #[error("value of kind {actual:?} cannot encode as {expected:?}")]
    KindMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("unresolvable method name: {0:?}")]
    UnknownMethod(String),
}

/// An application-level error carried in a packet's `ERRC` field.
///
/// The 32-bit error value packs the component id in the low 16 bits and
/// a 15-bit code in the high bits. Known `(component, code)` pairs
/// resolve to a symbolic name and description; unknown pairs fall back
/// to a generic entry instead of failing the decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{component}: {name} ({description})")]
pub struct BlazeError {
    /// Component name, or its numeric id when unresolved.
    pub component: String,
    /// Raw error code after the sign adjustment.
    pub code: i64,
    /// Symbolic error name, or the code rendered as text when unknown.
    pub name: String,
    /// Human-readable description.
    pub description: &'static str,
}

impl BlazeError {
    /// True when this error is the session-expiry signal that triggers
    /// a transparent relogin instead of surfacing to the caller.
    pub fn is_authentication_required(&self) -> bool {
        self.name == "ERR_AUTHENTICATION_REQUIRED"
    }
}
