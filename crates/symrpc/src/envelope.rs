//! # Protocol Envelopes
//!
//! Defines the structure of the wire envelope (Call vs Response vs Event).
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking
//!   on unknown data.
//! - **Correlation**: every `call` and `response` carries a correlation id;
//!   an `event` never does. Decoding enforces both directions.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;

/// The three flavors of envelope crossing the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Expects exactly one `Response` bearing the same correlation id.
    Call,
    /// Answers a prior `Call`.
    Response,
    /// Unsolicited push on a named channel; no correlation id.
    Event,
}

/// One discrete message exchanged over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: Kind,
    /// The remote operation or event-channel name.
    pub method: String,
    /// Opaque, structurally-typed data. Defaults to `null` when absent.
    #[serde(default)]
    pub payload: Value,
    /// Present on `call`/`response`, absent on `event`.
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// Builds a correlated call envelope.
    pub fn call(correlation_id: impl Into<String>, method: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Kind::Call,
            method: method.into(),
            payload,
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Builds the response to a prior call. The method field echoes the
    /// call's method for diagnostics; routing is by correlation id only.
    pub fn response(correlation_id: impl Into<String>, method: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Kind::Response,
            method: method.into(),
            payload,
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Builds an uncorrelated event envelope.
    pub fn event(method: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Kind::Event,
            method: method.into(),
            payload,
            correlation_id: None,
        }
    }

    /// Serializes this envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes an envelope and validates the correlation invariant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;

        match envelope.kind {
            Kind::Call | Kind::Response if envelope.correlation_id.is_none() => {
                Err(Error::ProtocolViolation(format!(
                    "{:?} envelope for '{}' is missing a correlation id",
                    envelope.kind, envelope.method
                )))
            }
            Kind::Event if envelope.correlation_id.is_some() => {
                Err(Error::ProtocolViolation(format!(
                    "Event envelope for '{}' carries a correlation id",
                    envelope.method
                )))
            }
            _ => Ok(envelope),
        }
    }
}
