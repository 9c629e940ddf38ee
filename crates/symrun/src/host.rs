//! # Execution Host
//!
//! Manages the lifecycle of one guest execution environment: materialize
//! the isolation boundary, hand the guest a live facade, run its entry
//! point, and tear everything down exactly once.
//!
//! Two sandbox modes share the one lifecycle contract:
//!
//! - **Inline**: the guest runs on the embedding application's own
//!   cooperative loop; the pipe pair is the encapsulation boundary.
//! - **Thread**: the guest runs on a dedicated OS thread with its own
//!   single-threaded runtime — the process-like boundary. The pipe is the
//!   only channel crossing it, and the runtime lives until `destroy`.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::watch;

use crate::caller::Caller;
use crate::caller::CallerConfig;
use crate::facade::UserFacade;
use crate::guest::Guest;
use crate::guest::GuestContext;
use crate::guest::Teardown;
use crate::pipe::Pipe;
use crate::transport::Transport;

#[derive(Debug)]
pub enum Error {
    /// The guest's entry point returned an error or died before mounting.
    Guest(String),
    /// The sandbox thread or its runtime could not be created.
    Sandbox(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest(msg) => write!(f, "Guest entry point failed: {}", msg),
            Self::Sandbox(msg) => write!(f, "Sandbox error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// How the guest's isolation boundary is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Shares the embedding application's cooperative loop.
    Inline,
    /// A dedicated thread with its own single-threaded runtime.
    Thread,
}

/// Lifecycle of an execution-host instance. Transitions are monotonic:
/// Unloaded -> Loading -> Mounted -> Unmounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unloaded,
    Loading,
    Mounted,
    Unmounted,
}

/// The external host-side endpoint of the bridge.
///
/// The embedding application implements this to receive the host end of the
/// pipe when a guest mounts. It is expected to speak the envelope protocol
/// symmetrically: answer every correlated call with exactly one response,
/// and push events at will.
pub trait HostBridge: Send + Sync + 'static {
    fn attach(&self, identity: &str, transport: Box<dyn Transport>);
}

struct Inner {
    lifecycle: Lifecycle,
    unmount_hooks: Vec<Teardown>,
    caller: Option<Arc<Caller>>,
    sandbox: Option<SandboxThread>,
}

type MountParts = (Arc<Caller>, Option<Teardown>, Option<SandboxThread>);

/// Artifacts of a Thread-mode mount: the shutdown trigger and the thread
/// itself.
struct SandboxThread {
    shutdown: oneshot::Sender<()>,
    join: std::thread::JoinHandle<()>,
}

/// One guest execution environment.
pub struct ExecutionHost {
    identity: String,
    mode: SandboxMode,
    guest: Arc<dyn Guest>,
    bridge: Arc<dyn HostBridge>,
    base_info: Value,
    caller_config: CallerConfig,
    inner: Mutex<Inner>,
    lifecycle_tx: watch::Sender<Lifecycle>,
}

impl ExecutionHost {
    pub fn new(
        identity: impl Into<String>,
        mode: SandboxMode,
        guest: Arc<dyn Guest>,
        bridge: Arc<dyn HostBridge>,
        base_info: Value,
        caller_config: CallerConfig,
    ) -> Self {
        let (lifecycle_tx, _) = watch::channel(Lifecycle::Unloaded);
        Self {
            identity: identity.into(),
            mode,
            guest,
            bridge,
            base_info,
            caller_config,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Unloaded,
                unmount_hooks: Vec::new(),
                caller: None,
                sandbox: None,
            }),
            lifecycle_tx,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().unwrap().lifecycle
    }

    /// Observes lifecycle transitions.
    pub fn watch_lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle_tx.subscribe()
    }

    /// The guest-side caller of a mounted instance.
    pub fn caller(&self) -> Option<Arc<Caller>> {
        self.inner.lock().unwrap().caller.clone()
    }

    /// Materializes the sandbox, connects the bridge, and runs the guest's
    /// entry point. A no-op unless the instance is Unloaded.
    pub async fn load(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.lifecycle != Lifecycle::Unloaded {
                return Ok(());
            }
            inner.lifecycle = Lifecycle::Loading;
        }
        self.lifecycle_tx.send_replace(Lifecycle::Loading);

        let (guest_end, host_end) = Pipe::pair();
        self.bridge.attach(&self.identity, Box::new(host_end));

        let mounted = match self.mode {
            SandboxMode::Inline => self.mount_inline(guest_end).await,
            SandboxMode::Thread => self.mount_thread(guest_end).await,
        };

        let (caller, teardown, sandbox) = match mounted {
            Ok(parts) => parts,
            Err(e) => {
                // A failed mount is terminal; destroy becomes a no-op.
                self.inner.lock().unwrap().lifecycle = Lifecycle::Unmounted;
                self.lifecycle_tx.send_replace(Lifecycle::Unmounted);
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.lifecycle != Lifecycle::Loading {
                // Destroyed while mounting: tear the fresh sandbox back down.
                drop(inner);
                caller.close();
                if let Some(sandbox) = sandbox {
                    let _ = sandbox.shutdown.send(());
                    let _ = sandbox.join.join();
                }
                if let Some(teardown) = teardown {
                    teardown();
                }
                return Ok(());
            }
            inner.caller = Some(caller);
            if let Some(teardown) = teardown {
                inner.unmount_hooks.push(teardown);
            }
            inner.sandbox = sandbox;
            inner.lifecycle = Lifecycle::Mounted;
        }
        self.lifecycle_tx.send_replace(Lifecycle::Mounted);
        Ok(())
    }

    async fn mount_inline(&self, guest_end: Pipe) -> Result<MountParts> {
        let caller = Arc::new(Caller::with_config(
            Box::new(guest_end),
            self.caller_config.clone(),
        ));
        let facade = UserFacade::new(Arc::clone(&caller), self.base_info.clone());
        let ctx = GuestContext {
            identity: self.identity.clone(),
            facade,
            caller: Arc::clone(&caller),
        };

        let teardown = self
            .guest
            .main(ctx)
            .await
            .map_err(|e| Error::Guest(e.to_string()))?;

        Ok((caller, teardown, None))
    }

    async fn mount_thread(&self, guest_end: Pipe) -> Result<MountParts> {
        type MountOutcome = std::result::Result<(Arc<Caller>, Option<Teardown>), String>;

        let (ready_tx, ready_rx) = oneshot::channel::<MountOutcome>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let guest = Arc::clone(&self.guest);
        let identity = self.identity.clone();
        let base_info = self.base_info.clone();
        let config = self.caller_config.clone();

        let join = std::thread::Builder::new()
            .name(format!("guest-{}", self.identity))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let caller =
                        Arc::new(Caller::with_config(Box::new(guest_end), config));
                    let facade = UserFacade::new(Arc::clone(&caller), base_info);
                    let ctx = GuestContext {
                        identity,
                        facade,
                        caller: Arc::clone(&caller),
                    };

                    match guest.main(ctx).await {
                        Ok(teardown) => {
                            let _ = ready_tx.send(Ok((caller, teardown)));
                            // Keep the runtime (pump, guest tasks) alive
                            // until destroy signals shutdown.
                            let _ = shutdown_rx.await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                        }
                    }
                });
            })
            .map_err(|e| Error::Sandbox(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok((caller, teardown))) => Ok((
                caller,
                teardown,
                Some(SandboxThread {
                    shutdown: shutdown_tx,
                    join,
                }),
            )),
            Ok(Err(msg)) => {
                let _ = join.join();
                Err(Error::Guest(msg))
            }
            Err(_) => {
                let _ = join.join();
                Err(Error::Sandbox("guest thread died before mounting".into()))
            }
        }
    }

    /// Registers a teardown action to run on unmount. Dropped with a
    /// warning once the instance is Unmounted.
    pub fn on_unmount(&self, hook: Teardown) {
        let mut inner = self.inner.lock().unwrap();
        if inner.lifecycle == Lifecycle::Unmounted {
            tracing::warn!(identity = %self.identity, "unmount hook registered after teardown");
            return;
        }
        inner.unmount_hooks.push(hook);
    }

    /// Runs every registered unmount hook exactly once, closes the guest
    /// caller, removes the sandbox artifact, and transitions to Unmounted.
    /// Calling it again is a no-op.
    pub fn destroy(&self) {
        let (hooks, caller, sandbox) = {
            let mut inner = self.inner.lock().unwrap();
            match inner.lifecycle {
                Lifecycle::Unmounted => return,
                Lifecycle::Unloaded => {
                    inner.lifecycle = Lifecycle::Unmounted;
                    drop(inner);
                    self.lifecycle_tx.send_replace(Lifecycle::Unmounted);
                    return;
                }
                _ => {}
            }
            inner.lifecycle = Lifecycle::Unmounted;
            (
                std::mem::take(&mut inner.unmount_hooks),
                inner.caller.take(),
                inner.sandbox.take(),
            )
        };

        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                tracing::error!(identity = %self.identity, "unmount hook panicked");
            }
        }

        if let Some(caller) = caller {
            caller.close();
        }

        if let Some(sandbox) = sandbox {
            let _ = sandbox.shutdown.send(());
            if sandbox.join.join().is_err() {
                tracing::error!(identity = %self.identity, "guest thread panicked");
            }
        }

        self.lifecycle_tx.send_replace(Lifecycle::Unmounted);
    }
}

/// Generates a random instance identity: `_` followed by nine base-36
/// characters.
pub fn gen_id() -> String {
    use rand::Rng;

    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let tail: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("_{}", tail)
}
