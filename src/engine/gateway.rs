// SPDX-License-Identifier: Apache-2.0

//! Query Execution Gateway
//!
//! Resolves a session id to its pool and runs SQL on it through the engine.
//! Every call marks the session as used and is recorded in the query metrics.

use std::sync::Arc;
use std::time::Instant;

use tracing::{field, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::{PoolRegistry, Session};
use crate::engine::traits::DataEngine;
use crate::engine::types::{QueryId, QueryOutput, SessionId, StatementResult, Value};
use crate::metrics;

const CANCELED_SQLSTATE: &str = "57014";

pub struct QueryGateway {
    engine: Arc<dyn DataEngine>,
    registry: Arc<PoolRegistry>,
}

impl QueryGateway {
    pub fn new(engine: Arc<dyn DataEngine>, registry: Arc<PoolRegistry>) -> Self {
        Self { engine, registry }
    }

    pub fn driver_id(&self) -> &'static str {
        self.engine.driver_id()
    }

    async fn resolve(&self, session_id: SessionId) -> EngineResult<Arc<Session>> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::session_not_found(session_id.to_string()))?;
        session.touch();
        Ok(session)
    }

    /// Runs raw SQL on the session's pool.
    #[instrument(
        skip(self, sql),
        fields(session_id = %session_id, sql_len = sql.len(), statements = field::Empty)
    )]
    pub async fn execute(
        &self,
        session_id: SessionId,
        sql: &str,
        query_id: Option<QueryId>,
    ) -> EngineResult<QueryOutput> {
        let session = self.resolve(session_id).await?;
        let start = Instant::now();

        let result = self.engine.execute(&session, sql, query_id).await;
        record(start, &result);

        if let Ok(output) = &result {
            tracing::Span::current().record("statements", output.results().len());
        }
        result
    }

    /// Runs one parameterized statement on the session's pool.
    #[instrument(skip(self, sql, params), fields(session_id = %session_id, params = params.len()))]
    pub async fn execute_params(
        &self,
        session_id: SessionId,
        sql: &str,
        params: &[Value],
    ) -> EngineResult<StatementResult> {
        let session = self.resolve(session_id).await?;
        let start = Instant::now();

        let result = self.engine.execute_params(&session, sql, params).await;
        record(start, &result);
        result
    }

    /// Cancels a running query started with `query_id`.
    #[instrument(skip(self), fields(session_id = %session_id, query_id = %query_id.0))]
    pub async fn cancel(&self, session_id: SessionId, query_id: QueryId) -> EngineResult<bool> {
        let session = self.resolve(session_id).await?;
        let cancelled = self.engine.cancel(&session, query_id).await?;
        if cancelled {
            metrics::record_cancel();
        }
        Ok(cancelled)
    }
}

fn record<T>(start: Instant, result: &EngineResult<T>) {
    let duration_ms = start.elapsed().as_micros() as f64 / 1000.0;
    metrics::record_query(duration_ms, result.is_ok());

    if let Err(err) = result {
        if err.code() == Some(CANCELED_SQLSTATE) {
            tracing::info!(duration_ms, "Query cancelled");
        } else {
            tracing::debug!(duration_ms, error = %err, "Query failed");
        }
    }
}
