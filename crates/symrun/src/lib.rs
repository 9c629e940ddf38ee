//! # symrun
//!
//! The runtime bridge between a host application and isolated, third-party
//! guest plugin units.
//!
//! ## Architecture
//!
//! - **Transport / Pipe**: ordered, lossless frame channel across the
//!   isolation boundary
//! - **Caller**: the duplex RPC engine — handshake, call correlation,
//!   event-hook dispatch, guest-served methods
//! - **UserFacade / AppProxy**: what guest code sees — typed convenience
//!   methods plus a schema-free forwarding surface for undeclared host
//!   capabilities
//! - **ExecutionHost**: one lifecycle contract over two sandbox modes
//!   (inline subtree vs dedicated thread)
//! - **Runtime / HostBuilder**: registry of guests and mounted instances
//!
//! Data flows guest code -> facade -> caller -> pipe -> host; host pushes
//! arrive on the pipe and either resolve a pending call or dispatch to a
//! registered hook.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use symrun::{Guest, GuestContext, HostBuilder, Runtime, Teardown};
//! use serde_json::json;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Guest for Hello {
//!     async fn main(&self, ctx: GuestContext) -> anyhow::Result<Option<Teardown>> {
//!         ctx.facade.ready(json!({})).await?;
//!         ctx.facade.app().show_msg("hello from the guest", None);
//!         Ok(None)
//!     }
//! }
//!
//! # async fn example(bridge: Arc<dyn symrun::HostBridge>) -> anyhow::Result<()> {
//! let rt = Arc::new(Runtime::new());
//! let guest_id = rt.register_guest(Arc::new(Hello));
//! let (_, host) = HostBuilder::new(Arc::clone(&rt), guest_id)
//!     .bridge(bridge)
//!     .mount()
//!     .await?;
//! host.destroy();
//! # Ok(())
//! # }
//! ```

pub mod caller;
pub mod facade;
pub mod guest;
pub mod hooks;
pub mod host;
pub mod pipe;
pub mod runtime;
pub mod settings;
pub mod transport;

pub use caller::Caller;
pub use caller::CallerConfig;
pub use caller::ConnectionState;
pub use facade::AppProxy;
pub use facade::UserFacade;
pub use guest::Guest;
pub use guest::GuestContext;
pub use guest::Teardown;
pub use hooks::HookHandler;
pub use hooks::HookRegistry;
pub use host::ExecutionHost;
pub use host::HostBridge;
pub use host::Lifecycle;
pub use host::SandboxMode;
pub use pipe::Pipe;
pub use runtime::GuestId;
pub use runtime::HostBuilder;
pub use runtime::HostId;
pub use runtime::Runtime;
pub use settings::deep_merge;
pub use transport::Transport;
