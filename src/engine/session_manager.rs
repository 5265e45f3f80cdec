// SPDX-License-Identifier: Apache-2.0

//! Session Manager
//!
//! Connection factory and session lifecycle: opens validated pools, registers
//! them under fresh session ids, and reclaims them on disconnect, idle sweep
//! or shutdown.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{self, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::{PoolRegistry, Session};
use crate::engine::traits::DataEngine;
use crate::engine::types::{ConnectionParams, PoolSettings, SessionId};
use crate::metrics;

/// Opens and reclaims sessions. Pools live in the shared [`PoolRegistry`].
pub struct SessionManager {
    engine: Arc<dyn DataEngine>,
    registry: Arc<PoolRegistry>,
    pool_settings: PoolSettings,
    connect_timeout: Duration,
}

impl SessionManager {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(15000);

    pub fn new(
        engine: Arc<dyn DataEngine>,
        registry: Arc<PoolRegistry>,
        pool_settings: PoolSettings,
    ) -> Self {
        Self {
            engine,
            registry,
            pool_settings,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Opens a pool, validates it and registers a new session.
    ///
    /// Nothing is registered on failure. Identical params always yield a new,
    /// independent session.
    #[instrument(
        skip(self, params),
        fields(
            host = %params.host,
            port = params.port,
            user = %params.user,
            database = %params.database
        )
    )]
    pub async fn connect(&self, params: &ConnectionParams) -> EngineResult<SessionId> {
        let connect_future = async {
            let pool = self.engine.open_pool(params, &self.pool_settings).await?;

            let session = Session::new(SessionId::new(), pool.clone(), params.display_name());
            match self.registry.insert(session).await {
                Ok(session) => Ok(session.id),
                Err(err) => {
                    pool.close().await;
                    Err(err)
                }
            }
        };

        let result = match timeout(self.connect_timeout, connect_future).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::connection_failed(format!(
                "Timed out after {}ms connecting to {}:{}",
                self.connect_timeout.as_millis(),
                params.host,
                params.port
            ))),
        };

        metrics::record_connect(result.is_ok());
        match &result {
            Ok(session_id) => tracing::info!(session_id = %session_id, "Session connected"),
            Err(err) => tracing::warn!(error = %err, "Connect failed"),
        }
        result
    }

    /// Unregisters a session and closes its pool.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn disconnect(&self, session_id: SessionId) -> EngineResult<()> {
        let session = self
            .registry
            .remove(session_id)
            .await
            .ok_or_else(|| EngineError::session_not_found(session_id.to_string()))?;

        session.pool.close().await;
        tracing::info!("Session disconnected");
        Ok(())
    }

    /// Reclaims sessions idle for longer than `ttl`. Returns how many were closed.
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let expired = self.registry.sweep_idle(ttl).await;
        for session in &expired {
            tracing::info!(
                session_id = %session.id,
                idle_secs = session.idle_for().as_secs(),
                "Closing idle session"
            );
        }
        join_all(expired.iter().map(|session| session.pool.close())).await;
        expired.len()
    }

    /// Runs [`Self::sweep_idle`] every `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        ttl: Duration,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = self.sweep_idle(ttl).await;
                        if closed > 0 {
                            let remaining = self.registry.len().await;
                            tracing::info!(closed, remaining, "Idle sweep");
                        }
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        })
    }

    /// Closes every registered pool. Used on shutdown.
    pub async fn close_all(&self) {
        let sessions = self.registry.drain().await;
        join_all(sessions.iter().map(|session| session.pool.close())).await;
        tracing::info!(count = sessions.len(), "Closed all sessions");
    }

    /// Checks if a session exists
    pub async fn session_exists(&self, session_id: SessionId) -> bool {
        self.registry.get(session_id).await.is_some()
    }
}
