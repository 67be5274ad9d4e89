//! x402 Facilitator HTTP entrypoint.
//!
//! Launches an axum server exposing `/verify`, `/settle`, `/supported`
//! (`spec.md` §4.H) over whichever EVM/Solana chains the config file names, wraps the
//! registry-backed facilitator in the lifecycle hook chain (`spec.md` §4.F), and runs
//! the upto-session sweeper (`spec.md` §4.E) alongside it.
//!
//! Environment:
//! - `.env` values loaded at startup.
//! - `HOST`, `PORT` control the bind address when the config file omits them.

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tower_http::cors;
use x402_facilitator_core::{handlers, run_sweeper, FacilitatorCore, FacilitatorLocal, InMemorySessionStore};

/// How long shutdown waits for the sweeper's in-flight settlement to finish before
/// giving up on it (`spec.md` §5: "in-flight settlements are awaited with a bounded
/// grace period (default 30 s) before the process exits").
const SWEEPER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

use crate::chain::build_registry;
use crate::config::Config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to initialize rustls crypto provider");

    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::load()?;

    let registry = build_registry(config.chains()).await?;
    let facilitator_local = FacilitatorLocal::new(registry);

    // The sweeper settles sessions accrued by the resource-server middleware's own
    // tracking, not via a fresh /verify call, so it talks to the plain registry-backed
    // facilitator rather than the hooked one the HTTP surface uses: going through the
    // "verified before settled" hook would reject every sweep.
    let session_store = Arc::new(InMemorySessionStore::new());
    let cancel = CancellationToken::new();
    let sweeper_facilitator = Arc::new(facilitator_local.clone());
    let sweeper_store = session_store.clone();
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        run_sweeper(sweeper_store, sweeper_facilitator, sweeper_cancel, x402_facilitator_core::DEFAULT_SWEEP_INTERVAL)
            .await;
    });

    let facilitator = Arc::new(FacilitatorCore::new(facilitator_local));
    let http_endpoints = Router::new().merge(handlers::routes::<FacilitatorLocal>().with_state(facilitator));
    let http_endpoints = http_endpoints.layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_token = cancel.clone();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        shutdown_token.cancel();
    });
    let graceful_shutdown = {
        let cancel = cancel.clone();
        async move { cancel.cancelled().await }
    };

    axum::serve(listener, http_endpoints).with_graceful_shutdown(graceful_shutdown).await?;
    cancel.cancel();

    if tokio::time::timeout(SWEEPER_SHUTDOWN_GRACE, sweeper_handle).await.is_err() {
        tracing::warn!("sweeper did not finish its in-flight settlement within the shutdown grace period");
    }

    Ok(())
}
