//! # Transport Abstraction
//!
//! A minimal, async interface for moving framed envelopes between the host
//! and guest contexts.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about envelopes, methods,
//!   or correlation. It moves opaque frames.
//! - **Ordered, Lossless, Per-Direction**: frames sent S1, S2 arrive S1, S2.
//!   Nothing is guaranteed about the relative ordering of the two directions.
//! - **Single Consumer**: one pump task owns `recv`; a terminal `Ok(None)` or
//!   `Err` is the disconnect signal, observed exactly once by that pump.

use std::fmt;

/// Errors that occur at the channel/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to exchange discrete frames with the peer context.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame. Fire-and-forget: completion means the frame was
    /// accepted for delivery, not that the peer consumed it.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Receives the next inbound frame.
    ///
    /// Returns `Ok(None)` when the peer closed the channel. After that (or
    /// after an `Err`) the transport is dead and `recv` must not be called
    /// again.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
