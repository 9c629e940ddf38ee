//! Guest entry-point contract.
//!
//! A guest is handed a [`GuestContext`] when its execution host mounts it —
//! there is no ambient global surface. The entry point runs once, registers
//! whatever hooks and provided methods it needs, and may hand back a
//! teardown action for unmount.

use std::sync::Arc;

use crate::caller::Caller;
use crate::facade::UserFacade;

/// A teardown action registered for unmount. Each runs exactly once.
pub type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Everything a guest gets: the facade and the caller it wraps.
///
/// The context is a back-reference — the execution host owns the connection
/// lifecycle, the guest only uses it.
pub struct GuestContext {
    /// Identity of the execution-host instance running this guest.
    pub identity: String,
    pub facade: UserFacade,
    pub caller: Arc<Caller>,
}

/// The isolated, third-party code unit running under an execution host.
///
/// # Example
///
/// ```rust,no_run
/// use symrun::{Guest, GuestContext, Teardown};
/// use serde_json::json;
///
/// struct Hello;
///
/// #[async_trait::async_trait]
/// impl Guest for Hello {
///     async fn main(&self, ctx: GuestContext) -> anyhow::Result<Option<Teardown>> {
///         ctx.facade.ready(json!({})).await?;
///         ctx.facade.app().show_msg("hello", None);
///         Ok(None)
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Guest: Send + Sync + 'static {
    /// The guest's declared entry point, executed during mount.
    ///
    /// Returning an `Err` aborts the mount. An `Ok(Some(teardown))` appends
    /// the teardown to the host's unmount hooks.
    async fn main(&self, ctx: GuestContext) -> anyhow::Result<Option<Teardown>>;
}
