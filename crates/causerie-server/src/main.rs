//! # causerie-server
//!
//! Group chat server. This binary provides:
//! - **WebSocket session protocol** for real-time messaging, reactions,
//!   seen markers, typing indicators, and pin updates
//! - **REST API** (axum) for login, account and group administration, and
//!   history/pin replay
//! - **Media storage** for image and video uploads referenced by messages
//! - **Signed access tokens** (ed25519) issued at login and presented over
//!   both transports

mod api;
mod config;
mod error;
mod fanout;
mod hub;
mod media;
mod throttle;
mod ws;

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use causerie_shared::constants::PIN_SWEEP_INTERVAL_SECS;
use causerie_shared::types::UserId;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::media::MediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,causerie_server=debug")),
        )
        .init();

    info!("Starting Causerie server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        default_group = %config.default_group_name,
        max_history = config.max_history,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Token signing key: from config, or ephemeral (tokens die with the
    // process).
    let signing_key = match config.token_signing_seed {
        Some(seed) => SigningKey::from_bytes(&seed),
        None => {
            warn!("TOKEN_SIGNING_KEY not set; generating an ephemeral signing key");
            SigningKey::generate(&mut OsRng)
        }
    };
    let verifying_key = signing_key.verifying_key();

    let hub = Arc::new(Hub::new(verifying_key, config.max_history));
    hub.bootstrap(
        UserId::new(&config.bootstrap_admin),
        config.bootstrap_admin.clone(),
        config.bootstrap_admin_password.clone(),
        &config.default_group_name,
    )
    .await?;
    if config.bootstrap_admin_password == "admin" {
        warn!("Bootstrap admin is using the default password; set BOOTSTRAP_ADMIN_PASSWORD");
    }

    let media = Arc::new(
        MediaStore::new(config.media_storage_path.clone(), config.max_media_size).await?,
    );

    let app_state = AppState {
        hub: hub.clone(),
        media,
        signing_key: Arc::new(signing_key),
        verifying_key,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic pin expiry sweep; lapsed pins are removed and the change is
    // broadcast to the affected groups.
    let sweeper = hub.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(PIN_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sweeper.sweep_pins().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
