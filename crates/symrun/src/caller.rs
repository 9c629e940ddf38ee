//! # Duplex RPC Caller
//!
//! The engine on the guest end of the bridge: connection handshake, call
//! correlation, and event-hook dispatch.
//!
//! The caller spawns a pump task that continuously reads from the transport
//! and routes each envelope: responses resolve the matching pending call by
//! correlation id, events dispatch to registered hooks, and inbound calls
//! are served from the provided-method registry. Responses to distinct
//! outstanding calls may arrive in any relative order; correctness depends
//! only on correlation ids.
//!
//! Each caller owns its transport exclusively and is bound to a single
//! connection: once the transport dies (or `close` is called) the caller is
//! permanently disconnected, and reconnecting requires a new instance.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use symrpc::Envelope;
use symrpc::Fault;
use symrpc::Kind;
use symrpc::ReplyPayload;
use symrpc::reply::codes;

use crate::hooks::HookHandler;
use crate::hooks::HookRegistry;
use crate::settings::deep_merge;
use crate::transport::Transport;

/// Method name of the handshake call.
pub const CONNECT_METHOD: &str = "connect";

#[derive(Debug, Clone)]
pub enum Error {
    /// No handshake response arrived within the handshake deadline.
    HandshakeTimeout,
    /// An individual call exceeded its timeout; the connection stays up.
    CallTimeout,
    /// The transport disconnected; every pending call is rejected with this
    /// exactly once, and the caller never recovers.
    ConnectionLost(String),
    /// The remote side answered with an error payload.
    Remote(Fault),
    /// The response bytes could not be understood.
    Protocol(String),
    /// A correlated call was issued before the handshake completed.
    NotConnected,
    /// The outstanding-call cap was reached; nothing was sent.
    ResourceExhausted { limit: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandshakeTimeout => write!(f, "Handshake timed out"),
            Self::CallTimeout => write!(f, "Call timed out"),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Remote(fault) => write!(f, "Remote failure: {}", fault),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::NotConnected => write!(f, "Not connected"),
            Self::ResourceExhausted { limit } => {
                write!(f, "Too many outstanding calls (limit {})", limit)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<symrpc::Error> for Error {
    fn from(e: symrpc::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Connection lifecycle of a caller. Transitions are monotonic per
/// instance: Disconnected -> Connecting -> Connected -> Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for a caller instance.
#[derive(Debug, Clone)]
pub struct CallerConfig {
    /// Default deadline for `call_async`.
    pub call_timeout: Duration,
    /// Deadline for the handshake; longer than a regular call's.
    pub handshake_timeout: Duration,
    /// Optional cap on concurrently outstanding calls.
    pub max_pending: Option<usize>,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(120),
            max_pending: None,
        }
    }
}

/// A guest-provided method served to the host over the same channel.
pub type MethodHandler =
    Arc<dyn Fn(Value) -> std::result::Result<Value, Fault> + Send + Sync>;

/// Response slot correlating to an in-flight call.
struct PendingCall {
    tx: oneshot::Sender<Result<Value>>,
    created: Instant,
}

struct Shared {
    transport: Arc<dyn Transport>,
    /// Ordered outbound queue; a single writer task drains it to the
    /// transport, so frames leave in the order they were enqueued.
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: DashMap<String, PendingCall>,
    methods: DashMap<String, MethodHandler>,
    hooks: HookRegistry,
    state: Mutex<StateCell>,
    dead: AtomicBool,
    seq: AtomicU64,
    config: CallerConfig,
}

struct StateCell {
    state: ConnectionState,
    base_info: Option<Value>,
}

impl Shared {
    /// Rejects every pending call and marks the caller dead. Runs its body
    /// exactly once per instance; later signals are no-ops.
    fn drain(&self, reason: &str) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }

        self.state.lock().unwrap().state = ConnectionState::Disconnected;

        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, pending)) = self.pending.remove(&key) {
                let _ = pending
                    .tx
                    .send(Err(Error::ConnectionLost(reason.to_string())));
            }
        }

        tracing::debug!(reason, "caller drained");
    }
}

/// Duplex RPC caller with an async pump for concurrent correlated calls.
pub struct Caller {
    shared: Arc<Shared>,
    connect_gate: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Caller {
    /// Creates a caller with default timeouts and spawns its pump and
    /// writer tasks. Must be called from within a tokio runtime.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_config(transport, CallerConfig::default())
    }

    /// Creates a caller with explicit tunables and spawns its pump and
    /// writer tasks.
    pub fn with_config(transport: Box<dyn Transport>, config: CallerConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            transport: Arc::from(transport),
            outbound,
            pending: DashMap::new(),
            methods: DashMap::new(),
            hooks: HookRegistry::new(),
            state: Mutex::new(StateCell {
                state: ConnectionState::Disconnected,
                base_info: None,
            }),
            dead: AtomicBool::new(false),
            seq: AtomicU64::new(1),
            config,
        });

        let pump = tokio::spawn(Self::pump(Arc::clone(&shared)));
        let writer = tokio::spawn(Self::write(Arc::clone(&shared), outbound_rx));

        Self {
            shared,
            connect_gate: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(vec![pump, writer]),
        }
    }

    async fn pump(shared: Arc<Shared>) {
        let reason = loop {
            match shared.transport.recv().await {
                Ok(Some(frame)) => match Envelope::from_bytes(&frame) {
                    Ok(envelope) => Self::handle_envelope(&shared, envelope),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed envelope");
                    }
                },
                Ok(None) => break "stream closed".to_string(),
                Err(e) => break e.to_string(),
            }
        };

        shared.drain(&reason);
    }

    async fn write(shared: Arc<Shared>, mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = shared.transport.send(&frame).await {
                tracing::warn!(error = %e, "outbound send failed");
                shared.drain(&e.to_string());
                break;
            }
        }
    }

    fn handle_envelope(shared: &Shared, envelope: Envelope) {
        match envelope.kind {
            Kind::Response => {
                // from_bytes guarantees the id is present.
                let Some(id) = envelope.correlation_id else {
                    return;
                };
                let Some((_, pending)) = shared.pending.remove(&id) else {
                    tracing::debug!(correlation_id = %id, "late or unknown response");
                    return;
                };

                let result = match ReplyPayload::decode(&envelope.payload) {
                    Ok(ReplyPayload::Ok(value)) => Ok(value),
                    Ok(ReplyPayload::Err(fault)) => Err(Error::Remote(fault)),
                    Err(e) => Err(Error::Protocol(e.to_string())),
                };

                // Ignore a receiver that already timed out.
                let _ = pending.tx.send(result);
            }

            Kind::Event => {
                shared.hooks.dispatch(&envelope.method, &envelope.payload);
            }

            Kind::Call => {
                let Some(id) = envelope.correlation_id else {
                    return;
                };
                Self::serve_call(shared, id, envelope.method, envelope.payload);
            }
        }
    }

    /// Answers an inbound host call from the provided-method registry with
    /// exactly one response envelope.
    fn serve_call(shared: &Shared, id: String, method: String, payload: Value) {
        let handler = shared
            .methods
            .get(&method)
            .map(|entry| Arc::clone(entry.value()));

        let outcome = match handler {
            Some(handler) => {
                catch_unwind(AssertUnwindSafe(|| handler(payload))).unwrap_or_else(|_| {
                    tracing::error!(%method, "provided method panicked");
                    Err(Fault::new(codes::INTERNAL, "method handler panicked"))
                })
            }
            None => Err(Fault::method_not_found(&method)),
        };

        let reply = match outcome {
            Ok(value) => ReplyPayload::ok(value),
            Err(fault) => ReplyPayload::err(fault),
        };

        let response = Envelope::response(id, method.clone(), reply);
        match response.to_bytes() {
            Ok(bytes) => {
                if shared.outbound.send(bytes).is_err() {
                    tracing::warn!(%method, "failed to answer inbound call: writer closed");
                }
            }
            Err(e) => tracing::warn!(%method, error = %e, "failed to encode response"),
        }
    }

    /// Performs the connection handshake.
    ///
    /// Sends a `call` envelope under [`CONNECT_METHOD`] carrying the local
    /// capability/model descriptor and awaits the host's base info, which is
    /// deep-merged into `local_model`. On success the caller transitions to
    /// Connected and caches the merged result; re-invoking while Connected
    /// returns the cache without touching the wire. Concurrent invocations
    /// serialize; the loser observes the winner's cache.
    pub async fn connect(&self, local_model: Value) -> Result<Value> {
        let _gate = self.connect_gate.lock().await;

        if self.shared.dead.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost("caller is closed".into()));
        }

        {
            let cell = self.shared.state.lock().unwrap();
            if cell.state == ConnectionState::Connected {
                if let Some(info) = &cell.base_info {
                    return Ok(info.clone());
                }
            }
        }

        self.shared.state.lock().unwrap().state = ConnectionState::Connecting;

        let handshake_timeout = self.shared.config.handshake_timeout;
        match self
            .send_correlated(CONNECT_METHOD, local_model.clone(), handshake_timeout)
            .await
        {
            Ok(remote_info) => {
                let mut merged = local_model;
                deep_merge(&mut merged, &[remote_info]);

                let mut cell = self.shared.state.lock().unwrap();
                cell.state = ConnectionState::Connected;
                cell.base_info = Some(merged.clone());
                Ok(merged)
            }
            Err(Error::CallTimeout) => {
                self.shared.drain("handshake timed out");
                Err(Error::HandshakeTimeout)
            }
            Err(e) => {
                self.shared.drain("handshake failed");
                Err(e)
            }
        }
    }

    /// Fire-and-forget notification to the host.
    ///
    /// Sends an `event`-kind envelope: no correlation id, no response
    /// expected. Never fails and never suspends; the envelope is enqueued
    /// for the writer task, preserving send order, and is logged and
    /// dropped when the caller is not Connected.
    pub fn call(&self, method: &str, payload: Value) {
        if self.state() != ConnectionState::Connected {
            tracing::warn!(method, "dropping fire-and-forget call while not connected");
            return;
        }

        let envelope = Envelope::event(method, payload);
        match envelope.to_bytes() {
            Ok(bytes) => {
                if self.shared.outbound.send(bytes).is_err() {
                    tracing::warn!(method, "fire-and-forget dropped: connection closed");
                }
            }
            Err(e) => tracing::warn!(method, error = %e, "failed to encode envelope"),
        }
    }

    /// Correlated call: allocates the next correlation id, registers a
    /// pending slot, sends a `call` envelope, and awaits the matching
    /// response. Concurrent outstanding calls resolve strictly by id,
    /// independent of response arrival order.
    pub async fn call_async(
        &self,
        method: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        match self.state() {
            ConnectionState::Connected => {}
            _ if self.shared.dead.load(Ordering::SeqCst) => {
                return Err(Error::ConnectionLost("caller is closed".into()));
            }
            _ => return Err(Error::NotConnected),
        }

        if let Some(limit) = self.shared.config.max_pending {
            if self.shared.pending.len() >= limit {
                return Err(Error::ResourceExhausted { limit });
            }
        }

        let timeout = timeout.unwrap_or(self.shared.config.call_timeout);
        self.send_correlated(method, payload, timeout).await
    }

    async fn send_correlated(
        &self,
        method: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let shared = &self.shared;

        let id = shared.seq.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        shared.pending.insert(
            id.clone(),
            PendingCall {
                tx,
                created: Instant::now(),
            },
        );

        let envelope = Envelope::call(id.clone(), method, payload);
        let bytes = envelope.to_bytes()?;

        if shared.outbound.send(bytes).is_err() {
            shared.pending.remove(&id);
            return Err(Error::ConnectionLost("writer closed".into()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                shared.pending.remove(&id);
                Err(Error::ConnectionLost("response channel closed".into()))
            }
            Err(_) => {
                if let Some((_, pending)) = shared.pending.remove(&id) {
                    tracing::debug!(
                        method,
                        elapsed = ?pending.created.elapsed(),
                        "call timed out"
                    );
                }
                Err(Error::CallTimeout)
            }
        }
    }

    /// Subscribes `handler` to the named event channel.
    pub fn on(&self, channel: &str, handler: HookHandler) {
        self.shared.hooks.on(channel, handler);
    }

    /// Subscribes `handler` for a single dispatch.
    pub fn once(&self, channel: &str, handler: HookHandler) {
        self.shared.hooks.once(channel, handler);
    }

    /// Removes the exact handler reference from the named channel.
    pub fn off(&self, channel: &str, handler: &HookHandler) {
        self.shared.hooks.off(channel, handler);
    }

    /// Registers a method the host can invoke over this connection.
    pub fn provide_method(&self, name: &str, handler: MethodHandler) {
        self.shared.methods.insert(name.to_string(), handler);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().unwrap().state
    }

    /// The merged base info cached by a successful handshake.
    pub fn base_info(&self) -> Option<Value> {
        self.shared.state.lock().unwrap().base_info.clone()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Explicit teardown: stops the pump and writer tasks and drains
    /// pending calls. Safe to call more than once.
    pub fn close(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.shared.drain("closed locally");
    }
}
