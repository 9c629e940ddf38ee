//! # User Facade
//!
//! The object handed to guest code: typed convenience methods over the
//! caller plus one dynamic forwarding surface ([`AppProxy`]) for host
//! capabilities that were never statically declared.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::caller::Caller;
use crate::caller::ConnectionState;
use crate::caller::Result;
use crate::hooks::HookHandler;
use crate::settings::deep_merge;

/// Namespace prefix of host-pushed app hook channels.
pub const HOOK_NAMESPACE: &str = "hook:app:";
/// Channel the host pushes merged settings updates on.
pub const SETTINGS_CHANGED_CHANNEL: &str = "settings:changed";

/// Fixed wire method names of the declared convenience surface.
pub mod methods {
    pub const PROVIDE_THEME: &str = "provider:theme";
    pub const PROVIDE_STYLE: &str = "provider:style";
    pub const PROVIDE_UI: &str = "provider:ui";
    pub const UPDATE_SETTINGS: &str = "settings:update";
    pub const MAIN_UI_ATTRS: &str = "main-ui:attrs";
    pub const MAIN_UI_STYLE: &str = "main-ui:style";
    pub const MAIN_UI_VISIBLE: &str = "main-ui:visible";
    /// Generic "call host method" envelope used by the dynamic surface.
    pub const APP_CALL: &str = "app:call";
}

/// Guest-facing wrapper around one live [`Caller`].
///
/// The facade does not own the caller's lifecycle — that belongs to the
/// execution host. All convenience methods validate shape and forward
/// without suspending; failures are logged and swallowed, never surfaced
/// to guest code.
#[derive(Clone)]
pub struct UserFacade {
    caller: Arc<Caller>,
    base_info: Arc<Mutex<Value>>,
}

impl UserFacade {
    /// Wraps `caller`, seeding the local base info defaults, and keeps the
    /// settings cache in sync with host-pushed updates.
    pub fn new(caller: Arc<Caller>, base_info: Value) -> Self {
        let base_info = Arc::new(Mutex::new(base_info));

        let cache = Arc::clone(&base_info);
        caller.on(
            SETTINGS_CHANGED_CHANNEL,
            Arc::new(move |payload: Value| {
                if !payload.is_object() {
                    tracing::warn!("ignoring non-object settings push");
                    return;
                }
                let mut info = cache.lock().unwrap();
                merge_settings(&mut info, payload);
            }),
        );

        Self { caller, base_info }
    }

    /// Performs the handshake and merges the host's base info into the
    /// local defaults. Safe to call again once connected: the cached result
    /// is returned and nothing touches the wire.
    pub async fn ready(&self, model: Value) -> Result<Value> {
        let merged = self.caller.connect(model).await?;
        let mut info = self.base_info.lock().unwrap();
        deep_merge(&mut info, &[merged]);
        Ok(info.clone())
    }

    /// Registers a theme with the host. Requires `name` and `url`.
    pub fn provide_theme(&self, theme: Value) {
        if !has_string(&theme, "name") || !has_string(&theme, "url") {
            tracing::warn!("theme registration requires 'name' and 'url'");
            return;
        }
        self.caller.call(methods::PROVIDE_THEME, theme);
    }

    /// Registers a stylesheet with the host. Accepts a raw style string or
    /// `{key, style}`.
    pub fn provide_style(&self, style: Value) {
        let ok = match &style {
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => has_string(&style, "style"),
            _ => false,
        };
        if !ok {
            tracing::warn!("style registration requires a style string");
            return;
        }
        self.caller.call(methods::PROVIDE_STYLE, style);
    }

    /// Registers a UI fragment with the host. Requires a non-empty
    /// `template` and a `path` or `slot` target; an unresolvable target is
    /// logged and the operation silently aborts.
    pub fn provide_ui(&self, ui: Value) {
        if !has_string(&ui, "template") {
            tracing::warn!("ui registration requires a 'template'");
            return;
        }
        if !has_string(&ui, "path") && !has_string(&ui, "slot") {
            tracing::warn!("cannot resolve ui target: neither 'path' nor 'slot' given");
            return;
        }
        self.caller.call(methods::PROVIDE_UI, ui);
    }

    /// Pushes a settings update to the host and folds it into the local
    /// settings cache.
    pub fn update_settings(&self, attrs: Value) {
        if !attrs.is_object() {
            tracing::warn!("settings update requires an object");
            return;
        }
        {
            let mut info = self.base_info.lock().unwrap();
            merge_settings(&mut info, attrs.clone());
        }
        self.caller.call(methods::UPDATE_SETTINGS, attrs);
    }

    /// Updates attributes of the guest's main surface.
    pub fn set_main_ui_attrs(&self, attrs: Value) {
        self.caller.call(methods::MAIN_UI_ATTRS, attrs);
    }

    /// Updates inline style of the guest's main surface.
    pub fn set_main_ui_style(&self, style: Value) {
        self.caller.call(methods::MAIN_UI_STYLE, style);
    }

    pub fn show_main_ui(&self) {
        self.caller
            .call(methods::MAIN_UI_VISIBLE, json!({ "visible": true }));
    }

    pub fn hide_main_ui(&self) {
        self.caller
            .call(methods::MAIN_UI_VISIBLE, json!({ "visible": false }));
    }

    pub fn toggle_main_ui(&self) {
        self.caller
            .call(methods::MAIN_UI_VISIBLE, json!({ "toggle": true }));
    }

    pub fn connected(&self) -> bool {
        self.caller.state() == ConnectionState::Connected
    }

    /// Snapshot of the merged base info.
    pub fn base_info(&self) -> Value {
        self.base_info.lock().unwrap().clone()
    }

    /// Snapshot of the settings section of the base info.
    pub fn settings(&self) -> Value {
        self.base_info
            .lock()
            .unwrap()
            .get("settings")
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// The wrapped caller.
    pub fn caller(&self) -> &Arc<Caller> {
        &self.caller
    }

    /// The dynamic forwarding surface for host "app" capabilities.
    pub fn app(&self) -> AppProxy {
        AppProxy {
            caller: Arc::clone(&self.caller),
        }
    }
}

fn merge_settings(info: &mut Value, attrs: Value) {
    if !info.is_object() {
        *info = Value::Object(Map::new());
    }
    if let Some(map) = info.as_object_mut() {
        let settings = map
            .entry("settings".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !settings.is_object() {
            *settings = Value::Object(Map::new());
        }
        deep_merge(settings, &[attrs]);
    }
}

fn has_string(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// How a hook-shaped property name manages its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOp {
    On,
    Once,
    Off,
}

/// The guest-facing "App" capability object.
///
/// Host capabilities are open-ended and host-versioned, so this surface is
/// schema-free: [`AppProxy::hook`] routes hook-shaped names to
/// subscriptions, and [`AppProxy::invoke`] forwards everything else as a
/// generic host method call with no compile-time verification of existence
/// or signature. The typed methods below are stubs for the stable, declared
/// part of the surface.
#[derive(Clone)]
pub struct AppProxy {
    caller: Arc<Caller>,
}

impl AppProxy {
    /// Routes a hook-shaped property access (`on…`/`once…`/`off…`).
    ///
    /// The remote channel is derived by snake-casing the camelCase suffix
    /// under the `hook:app:` namespace — `onPageFileMounted` subscribes to
    /// `hook:app:page_file_mounted`. `off…` removes the exact handler
    /// reference. Returns false (and registers nothing) when the name does
    /// not match the hook pattern; use [`AppProxy::invoke`] for those.
    pub fn hook(&self, prop: &str, handler: HookHandler) -> bool {
        let Some((op, channel)) = derive_hook_channel(prop) else {
            return false;
        };
        match op {
            HookOp::On => self.caller.on(&channel, handler),
            HookOp::Once => self.caller.once(&channel, handler),
            HookOp::Off => self.caller.off(&channel, &handler),
        }
        true
    }

    /// Invokes an arbitrary host capability by name.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.caller
            .call_async(
                methods::APP_CALL,
                json!({ "method": method, "args": args }),
                None,
            )
            .await
    }

    /// Like [`AppProxy::invoke`] with an explicit deadline.
    pub async fn invoke_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.caller
            .call_async(
                methods::APP_CALL,
                json!({ "method": method, "args": args }),
                Some(timeout),
            )
            .await
    }

    // Typed stubs over the declared host surface.

    pub fn push_state(&self, key: &str, params: Value) {
        self.fire("pushState", vec![json!(key), params]);
    }

    pub fn replace_state(&self, key: &str, params: Value) {
        self.fire("replaceState", vec![json!(key), params]);
    }

    pub async fn get_user_state(&self) -> Result<Value> {
        self.invoke("getUserState", Vec::new()).await
    }

    pub fn show_msg(&self, content: &str, status: Option<&str>) {
        let mut args = vec![json!(content)];
        if let Some(status) = status {
            args.push(json!(status));
        }
        self.fire("showMsg", args);
    }

    pub fn set_zoom_factor(&self, factor: f64) {
        self.fire("setZoomFactor", vec![json!(factor)]);
    }

    pub fn on_theme_mode_changed(&self, handler: HookHandler) {
        self.hook("onThemeModeChanged", handler);
    }

    pub fn on_page_file_mounted(&self, handler: HookHandler) {
        self.hook("onPageFileMounted", handler);
    }

    /// Valueless invoke: the result is discarded, errors are logged.
    fn fire(&self, method: &str, args: Vec<Value>) {
        let proxy = self.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            if let Err(e) = proxy.invoke(&method, args).await {
                tracing::warn!(%method, error = %e, "host method call failed");
            }
        });
    }
}

/// Parses a hook-shaped property name into its operation and derived
/// channel. Prefix matching is case-insensitive; the camelCase suffix is
/// snake-cased and namespaced.
pub fn derive_hook_channel(prop: &str) -> Option<(HookOp, String)> {
    // Longest prefix first, so "once…" never parses as "on" + "ce…".
    const PREFIXES: [(&str, HookOp); 3] = [
        ("once", HookOp::Once),
        ("off", HookOp::Off),
        ("on", HookOp::On),
    ];

    for (prefix, op) in PREFIXES {
        let Some((head, suffix)) = prop.split_at_checked(prefix.len()) else {
            continue;
        };
        if !suffix.is_empty() && head.eq_ignore_ascii_case(prefix) {
            return Some((op, format!("{}{}", HOOK_NAMESPACE, snake_case(suffix))));
        }
    }
    None
}

/// camelCase to lowercase underscore-separated. Word boundaries fall at
/// lower/digit-to-upper transitions and before the final capital of an
/// acronym run; digits attach to the preceding word.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let boundary = match i.checked_sub(1).map(|j| chars[j]) {
                Some(prev) if prev.is_lowercase() || prev.is_ascii_digit() => true,
                Some(prev) if prev.is_uppercase() => {
                    chars.get(i + 1).is_some_and(|next| next.is_lowercase())
                }
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
