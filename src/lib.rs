// pgdeck - Web administration backend for PostgreSQL
// Core library

pub mod commands;
pub mod config;
pub mod engine;
pub mod http;
pub mod metrics;
pub mod observability;
pub mod profiles;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use config::ServerConfig;
use engine::drivers::PostgresDriver;
use engine::{DataEngine, PoolRegistry, QueryGateway, SessionManager};
use http::ServerError;
use profiles::{FileProfileStore, ProfileStore};

/// Shared handler state. Cheap to clone; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<QueryGateway>,
    pub profiles: Arc<dyn ProfileStore>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires one registry into both the session manager and the gateway.
    pub fn new(
        engine: Arc<dyn DataEngine>,
        profiles: Arc<dyn ProfileStore>,
        config: &ServerConfig,
    ) -> Self {
        let registry = Arc::new(PoolRegistry::new(config.max_sessions));
        let sessions = SessionManager::new(
            Arc::clone(&engine),
            Arc::clone(&registry),
            config.pool_settings(),
        )
        .with_connect_timeout(config.connect_timeout());
        let gateway = QueryGateway::new(engine, registry);

        Self {
            sessions: Arc::new(sessions),
            gateway: Arc::new(gateway),
            profiles,
            started_at: Instant::now(),
        }
    }
}

/// Runs the server until Ctrl+C or SIGTERM, then stops the sweeper and
/// closes every registered pool.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let profiles_path = config.saved_servers_path();
    tracing::info!(saved_servers = %profiles_path.display(), "Using saved servers file");

    let state = AppState::new(
        Arc::new(PostgresDriver::new()),
        Arc::new(FileProfileStore::new(profiles_path)),
        &config,
    );
    let router = http::build_router(state.clone(), &config.allowed_origin)?;

    let shutdown = CancellationToken::new();
    let sweeper = Arc::clone(&state.sessions).spawn_sweeper(
        config.session_ttl(),
        config.sweep_interval(),
        shutdown.clone(),
    );

    let result = http::serve(router, config.bind, http::shutdown_signal()).await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Session sweeper task failed");
    }
    state.sessions.close_all().await;

    result
}
