//! In-memory duplex transport.
//!
//! A `Pipe` pair is the channel crossing the isolation boundary when host
//! and guest share a process: frames sent on one end appear, in order, on
//! the other end. Dropping every clone of one end closes the channel, which
//! the surviving end observes as a disconnect.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an in-memory duplex channel.
#[derive(Clone)]
pub struct Pipe {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl Pipe {
    /// Creates a pair of connected ends.
    ///
    /// Frames sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: tx_a,
            rx: Arc::new(Mutex::new(rx_b)),
        };

        let b = Self {
            tx: tx_b,
            rx: Arc::new(Mutex::new(rx_a)),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for Pipe {
    async fn send(&self, frame: &[u8]) -> transport::Result<()> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
