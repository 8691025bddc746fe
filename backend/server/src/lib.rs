//! Self-service drink tally kiosk.
//!
//! One shared price list, one tally per device, deposit ("Pfand") returns tracked per
//! deposit amount. The UI is a flip card: tally on the front, PIN-gated price editor on
//! the back.
//!
//!
//!
//! # General Infrastructure
//! - Single axum server, htmx frontend rendered server side with minijinja
//! - Catalog loaded from `drinks.yml` at startup, replaced wholesale by admin uploads
//! - Each device gets a `kiosk_device` cookie, its tally lives in the in-memory session store
//! - Every action re-renders the whole card, nothing is pushed to devices
//!
//!
//!
//! # Notes
//!
//! ## Index based drinks
//! Session counts are matched to drinks by position. An upload that drops the last drink
//! truncates every session on its next request, an upload that reorders drinks moves the
//! counts onto whatever drink now sits at that position. Devices should be reset after
//! reordering the catalog.
//!
//! ## Negative totals
//! More deposit returned than tallied gives a negative total. That is money the kiosk
//! owes, so it is shown in red rather than clamped.
//!
//! ## Restarts
//! Nothing is persisted. A restart reloads `drinks.yml` (admin uploads are lost) and
//! every device starts from zero. A device idle for longer than `SESSION_TTL_SECS` also
//! starts from zero.
//!
//!
//!
//! # Setup
//!
//! Environment.
//! ```sh
//! RUST_PORT=1111
//! DRINKS_PATH=drinks.yml
//! STATIC_DIR=static
//! ADMIN_PIN=4711        # or /run/secrets/ADMIN_PIN
//! SESSION_TTL_SECS=86400
//! RUST_LOG=info
//! ```
//!
//! Run from `backend/` so the default paths resolve.
//! ```sh
//! cargo run --release
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod total;
pub mod utils;

use catalog::PriceCatalog;
use config::Config;
use routes::{
    card_handler, change_handler, flip_handler, health_handler, pin_handler,
    reset_handler, return_pfand_handler, upload_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load();

    info!("Loading catalog from {}", config.drinks_path);
    let catalog = PriceCatalog::from_file(&config.drinks_path)
        .with_context(|| format!("Failed to load catalog from {}", config.drinks_path))?;
    info!(
        "Loaded {} drinks, default deposit {}",
        catalog.len(),
        catalog.default_deposit()
    );

    info!("Initializing state...");
    let state = AppState::new(config, catalog)?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(card_handler))
        .route("/health", get(health_handler))
        .route("/flip", get(flip_handler))
        .route("/pin", post(pin_handler))
        .route("/change/{index}/{delta}", post(change_handler))
        .route("/return_pfand/{amount}/{delta}", post(return_pfand_handler))
        .route("/upload", post(upload_handler))
        .route("/reset", post(reset_handler))
        .nest_service("/static", assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
