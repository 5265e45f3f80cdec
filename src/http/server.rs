// SPDX-License-Identifier: Apache-2.0

//! Router assembly and server lifecycle

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::gate::session_gate;
use crate::commands::{connection, metrics, mutation, query, roles};
use crate::AppState;

const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid allowed origin '{origin}'")]
    InvalidOrigin { origin: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the full router. Everything except the bootstrap endpoints goes
/// through the session gate.
pub fn build_router(state: AppState, allowed_origin: &str) -> Result<Router, ServerError> {
    let origin = HeaderValue::from_str(allowed_origin).map_err(|_| ServerError::InvalidOrigin {
        origin: allowed_origin.to_string(),
    })?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::POST, Method::OPTIONS, Method::GET])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE);

    let public = Router::new()
        .route("/connect-db", post(connection::connect_db))
        .route("/saved-servers", get(connection::saved_servers))
        .route("/health", get(metrics::health))
        .route("/metrics", get(metrics::metrics));

    let gated = Router::new()
        .route("/", post(connection::overview))
        .route("/get-db-details", post(connection::db_details))
        .route("/disconnect", post(connection::disconnect))
        // Raw SQL
        .route("/query-table", post(query::query_table))
        .route("/update-table", post(query::update_table))
        .route("/mutate-dbData", post(query::mutate_db_data))
        .route("/alter-table", post(query::alter_table))
        .route("/create-table", post(query::create_table))
        .route("/cancel-query", post(query::cancel_query))
        // Generated DDL/DML
        .route("/drop-table", post(mutation::drop_table))
        .route("/delete-row", post(mutation::delete_row))
        .route("/create-index", post(mutation::create_index))
        .route("/drop-index", post(mutation::drop_index))
        // Roles
        .route("/create-role", post(roles::create_role))
        .route("/drop-role", post(roles::drop_role))
        .route("/reassign-owned", post(roles::reassign_owned))
        .route("/drop-owned", post(roles::drop_owned))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_gate));

    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    Ok(public.merge(gated).with_state(state).layer(layers))
}

/// Serves `router` on `addr` until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(addr = %listener.local_addr()?, "pgdeck listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
