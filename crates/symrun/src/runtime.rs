//! # Runtime Registry
//!
//! Central registry for the embedding application: registered guests and
//! their running execution-host instances.
//!
//! Uses DashMap for concurrent access without global locking, so multiple
//! tasks can register guests or mount instances simultaneously.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde_json::Value;

use crate::caller::CallerConfig;
use crate::guest::Guest;
use crate::host;
use crate::host::ExecutionHost;
use crate::host::HostBridge;
use crate::host::SandboxMode;
use crate::host::gen_id;

/// Strong type for registered-guest identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct GuestId(pub u64);

impl std::fmt::Display for GuestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "guest-{}", self.0)
    }
}

/// Strong type for running-instance identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct HostId(pub u64);

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

#[derive(Debug)]
pub enum Error {
    GuestNotFound(GuestId),
    HostNotFound(HostId),
    /// The builder was not given a host bridge.
    MissingBridge,
    Host(host::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GuestNotFound(id) => write!(f, "Guest not found: {}", id),
            Self::HostNotFound(id) => write!(f, "Host not found: {}", id),
            Self::MissingBridge => write!(f, "No host bridge configured"),
            Self::Host(e) => write!(f, "Host error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<host::Error> for Error {
    fn from(e: host::Error) -> Self {
        Self::Host(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The central registry of guests and running instances.
pub struct Runtime {
    guests: DashMap<GuestId, Arc<dyn Guest>>,
    hosts: DashMap<HostId, Arc<ExecutionHost>>,
    next_guest_id: AtomicU64,
    next_host_id: AtomicU64,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            guests: DashMap::new(),
            hosts: DashMap::new(),
            next_guest_id: AtomicU64::new(1),
            next_host_id: AtomicU64::new(1),
        }
    }

    /// Registers a guest unit and returns its unique ID.
    pub fn register_guest(&self, guest: Arc<dyn Guest>) -> GuestId {
        let id = GuestId(self.next_guest_id.fetch_add(1, Ordering::Relaxed));
        self.guests.insert(id, guest);
        id
    }

    /// Retrieves a registered guest by ID.
    pub fn get_guest(&self, id: GuestId) -> Result<Arc<dyn Guest>> {
        self.guests
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::GuestNotFound(id))
    }

    /// Retrieves a running instance by ID.
    pub fn get_host(&self, id: HostId) -> Result<Arc<ExecutionHost>> {
        self.hosts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::HostNotFound(id))
    }

    pub(crate) fn register_host(&self, host: Arc<ExecutionHost>) -> HostId {
        let id = HostId(self.next_host_id.fetch_add(1, Ordering::Relaxed));
        self.hosts.insert(id, host);
        id
    }

    /// Destroys a running instance and removes it from the registry.
    pub fn destroy_host(&self, id: HostId) -> Result<()> {
        let (_, host) = self.hosts.remove(&id).ok_or(Error::HostNotFound(id))?;
        host.destroy();
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for mounting a registered guest into an execution host.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use symrun::{Runtime, HostBuilder, SandboxMode};
/// # async fn example(
/// #     rt: Arc<Runtime>,
/// #     guest_id: symrun::GuestId,
/// #     bridge: Arc<dyn symrun::HostBridge>,
/// # ) -> anyhow::Result<()> {
/// let (host_id, host) = HostBuilder::new(Arc::clone(&rt), guest_id)
///     .mode(SandboxMode::Thread)
///     .base_info(serde_json::json!({ "settings": { "disabled": false } }))
///     .bridge(bridge)
///     .mount()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HostBuilder {
    runtime: Arc<Runtime>,
    guest_id: GuestId,
    identity: Option<String>,
    mode: SandboxMode,
    base_info: Value,
    caller_config: CallerConfig,
    bridge: Option<Arc<dyn HostBridge>>,
}

impl HostBuilder {
    pub fn new(runtime: Arc<Runtime>, guest_id: GuestId) -> Self {
        Self {
            runtime,
            guest_id,
            identity: None,
            mode: SandboxMode::Inline,
            base_info: Value::Object(serde_json::Map::new()),
            caller_config: CallerConfig::default(),
            bridge: None,
        }
    }

    /// Explicit instance identity; a random one is generated otherwise.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn mode(mut self, mode: SandboxMode) -> Self {
        self.mode = mode;
        self
    }

    /// Local base-info defaults handed to the guest's facade.
    pub fn base_info(mut self, base_info: Value) -> Self {
        self.base_info = base_info;
        self
    }

    pub fn caller_config(mut self, config: CallerConfig) -> Self {
        self.caller_config = config;
        self
    }

    /// The host-side endpoint that receives the host end of the pipe.
    pub fn bridge(mut self, bridge: Arc<dyn HostBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Builds the execution host, loads the guest, and registers the
    /// mounted instance.
    pub async fn mount(self) -> Result<(HostId, Arc<ExecutionHost>)> {
        let guest = self.runtime.get_guest(self.guest_id)?;
        let bridge = self.bridge.ok_or(Error::MissingBridge)?;
        let identity = self.identity.unwrap_or_else(gen_id);

        let host = Arc::new(ExecutionHost::new(
            identity,
            self.mode,
            guest,
            bridge,
            self.base_info,
            self.caller_config,
        ));

        host.load().await?;

        let id = self.runtime.register_host(Arc::clone(&host));
        Ok((id, host))
    }
}
