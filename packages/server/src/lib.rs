#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for parking watch.
//!
//! Exposes the occupancy store as JSON over HTTP for the compliance
//! dashboard, and runs the traffic simulator in the background so the
//! dashboard has something to watch.

mod handlers;
pub mod interactive;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use chrono::Utc;
use parking_watch_simulation::Simulator;
use parking_watch_simulation::rush_hour::RushHourSource;
use parking_watch_store::OccupancyStore;

/// Default simulator tick period, matching the dashboard's polling cadence.
pub const DEFAULT_TICK_MS: u64 = 5000;

/// Shared application state.
pub struct AppState {
    /// Lots and violations.
    pub store: Arc<OccupancyStore>,
    /// Background traffic simulator feeding `store`.
    pub simulator: Arc<Simulator>,
}

impl AppState {
    /// Wraps a provisioned store with a stopped simulator.
    #[must_use]
    pub fn new(store: Arc<OccupancyStore>, rng_seed: u64) -> Self {
        let simulator = Arc::new(Simulator::new(store.clone(), rng_seed));
        Self { store, simulator }
    }
}

/// Server settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `BIND_ADDR`, default `127.0.0.1`.
    pub bind_addr: String,
    /// `PORT`, default `8080`.
    pub port: u16,
    /// `SIMULATION_TICK_MS`, default [`DEFAULT_TICK_MS`].
    pub tick_interval: Duration,
    /// `SIMULATION_RNG_SEED`, default derived from the clock.
    pub rng_seed: u64,
}

impl ServerConfig {
    /// Reads settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let tick_ms = std::env::var("SIMULATION_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TICK_MS);
        let rng_seed = std::env::var("SIMULATION_RNG_SEED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| Utc::now().timestamp_micros().unsigned_abs());

        Self {
            bind_addr,
            port,
            tick_interval: Duration::from_millis(tick_ms),
            rng_seed,
        }
    }
}

/// Registers the `/api` routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/lots", web::get().to(handlers::lots))
            .route("/lots/{id}", web::get().to(handlers::lot))
            .route("/observations", web::post().to(handlers::submit_observation))
            .route("/violations", web::get().to(handlers::violations))
            .route("/violations/{id}", web::get().to(handlers::violation))
            .route("/offenders", web::get().to(handlers::offenders))
            .route("/stats", web::get().to(handlers::stats))
            .route("/heatmap", web::get().to(handlers::heatmap))
            .route("/simulation", web::get().to(handlers::simulation_state))
            .route(
                "/simulation/start",
                web::post().to(handlers::simulation_start),
            )
            .route("/simulation/stop", web::post().to(handlers::simulation_stop))
            .route("/reset", web::post().to(handlers::reset)),
    );
}

/// Starts the parking watch API server.
///
/// Provisions the store from the seed roster (`PARKING_WATCH_SEED` or the
/// embedded default), spawns the background simulator ticker, and serves
/// until the server shuts down. The caller provides the async runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the seed cannot be provisioned,
/// the HTTP server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    // The CLI may already have installed its own logger.
    pretty_env_logger::try_init_custom_env("RUST_LOG").ok();

    let config = ServerConfig::from_env();

    log::info!("Provisioning occupancy store...");
    let store = OccupancyStore::from_env(Utc::now()).map_err(std::io::Error::other)?;
    let state = AppState::new(Arc::new(store), config.rng_seed);
    let simulator = state.simulator.clone();
    let data = web::Data::new(state);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(routes)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let ticker = actix_web::rt::spawn(parking_watch_simulation::run_polling(
        simulator,
        RushHourSource::new(config.rng_seed),
        config.tick_interval,
        async move {
            let _ = shutdown_rx.await;
        },
    ));

    let result = server.await;

    let _ = shutdown_tx.send(());
    if let Err(e) = ticker.await {
        log::error!("Simulation ticker panicked: {e}");
    }

    result
}
