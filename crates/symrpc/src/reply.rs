//! # Reply Payloads
//!
//! The payload convention for `response` envelopes: `{"ok": value}` on
//! success, `{"err": fault}` on failure. A response with neither key is a
//! protocol violation.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;

/// Well-known fault codes emitted by protocol endpoints themselves.
/// Application code is free to use its own codes.
pub mod codes {
    /// The named method does not exist on the callee.
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    /// The callee rejected the call arguments.
    pub const INVALID_ARGUMENTS: &str = "invalid_arguments";
    /// The callee failed internally while handling the call.
    pub const INTERNAL: &str = "internal";
}

/// A remote-supplied failure: the callee handled the call and reports that
/// the operation itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: String,
    pub message: String,
    /// Free-form detail supplied by the remote side.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// The standard fault for a call naming an unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("no method named '{}'", method))
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// The decoded payload of a `response` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPayload {
    Ok(Value),
    Err(Fault),
}

impl ReplyPayload {
    /// Encodes a success payload.
    pub fn ok(value: Value) -> Value {
        serde_json::json!({ "ok": value })
    }

    /// Encodes a failure payload.
    pub fn err(fault: Fault) -> Value {
        serde_json::json!({ "err": fault })
    }

    /// Decodes a response payload, rejecting shapes with neither an `ok`
    /// nor an `err` key.
    pub fn decode(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone()).map_err(|_| {
            Error::ProtocolViolation(format!(
                "response payload has neither 'ok' nor 'err': {}",
                payload
            ))
        })
    }
}
