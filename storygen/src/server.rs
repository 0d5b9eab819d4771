use std::sync::Arc;

use anyhow::{anyhow, Result};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::{get, post, routes, Build, Rocket, State};

use common::Config;

use crate::content::{Clock, ContentProvider};
use crate::handler::{handle_generate, GenerateContext};
use crate::storage::DocumentStore;

/// Application state stored inside Rocket managed state.
/// Built once at startup and shared read-only by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub content: Arc<dyn ContentProvider>,
    pub clock: Arc<dyn Clock>,
    pub collection: String,
    pub secret: String,
}

impl AppState {
    fn generate_context(&self) -> GenerateContext<'_> {
        GenerateContext {
            store: self.store.as_ref(),
            provider: self.content.as_ref(),
            clock: self.clock.as_ref(),
            collection: &self.collection,
            secret: &self.secret,
        }
    }
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Manual trigger for the daily batch. `?key=` must match the configured secret.
#[get("/generate_stories_manual?<key>")]
async fn generate_stories_manual(state: &State<AppState>, key: Option<String>) -> (Status, String) {
    handle_generate(&state.generate_context(), key.as_deref()).await
}

#[post("/generate_stories_manual?<key>")]
async fn generate_stories_manual_post(state: &State<AppState>, key: Option<String>) -> (Status, String) {
    handle_generate(&state.generate_context(), key.as_deref()).await
}

/// Rocket instance with state managed and routes mounted, ready to launch or to drive from tests.
pub fn build_rocket(figment: Figment, state: AppState) -> Rocket<Build> {
    rocket::custom(figment).manage(state).mount(
        "/",
        routes![health, generate_stories_manual, generate_stories_manual_post],
    )
}

/// Rocket's default figment with `[server] bind` / `port` from the application config applied.
pub fn figment_from_config(config: &Config) -> Figment {
    let mut fig = rocket::Config::figment();
    if let Some(bind) = &config.server.bind {
        fig = fig.merge(("address", bind.clone()));
    }
    if let Some(port) = config.server.port {
        fig = fig.merge(("port", port));
    }
    fig
}

/// Launch the HTTP server. Blocks until Rocket shuts down.
pub async fn launch_rocket(config: &Config, state: AppState) -> Result<()> {
    tracing::info!(collection = %state.collection, "Starting Rocket HTTP server");
    build_rocket(figment_from_config(config), state)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
