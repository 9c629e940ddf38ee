use std::sync::Arc;

use serde_json::json;
use symrun::Guest;
use symrun::GuestContext;
use symrun::Teardown;

/// Minimal demo guest: handshake, one style, one served method.
pub struct HelloGuest;

#[async_trait::async_trait]
impl Guest for HelloGuest {
    async fn main(&self, ctx: GuestContext) -> anyhow::Result<Option<Teardown>> {
        let info = ctx
            .facade
            .ready(json!({ "settings": { "disabled": false } }))
            .await?;

        ctx.facade
            .provide_style(json!(".hello-banner { font-weight: bold }"));

        let app = ctx.facade.app();
        app.show_msg(&format!("hello from {}", info["id"]), Some("success"));

        ctx.caller.provide_method(
            "hello:describe",
            Arc::new(move |_| Ok(info.clone())),
        );

        Ok(Some(Box::new(|| {
            tracing::info!("hello guest unmounted");
        })))
    }
}
