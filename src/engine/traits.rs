// SPDX-License-Identifier: Apache-2.0

//! DataEngine trait definition
//!
//! The seam between session bookkeeping and the database driver. Pools are
//! owned by the [`PoolRegistry`](crate::engine::registry::PoolRegistry); the
//! engine only opens them and runs statements on them.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::engine::error::EngineResult;
use crate::engine::registry::Session;
use crate::engine::types::{
    ConnectionParams, PoolSettings, QueryId, QueryOutput, StatementResult, Value,
};

#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "postgres")
    fn driver_id(&self) -> &'static str;

    /// Opens a pool and proves it with one acquire+release.
    ///
    /// On failure the pool is closed before the error is returned.
    async fn open_pool(
        &self,
        params: &ConnectionParams,
        settings: &PoolSettings,
    ) -> EngineResult<PgPool>;

    /// Executes raw SQL, possibly several `;`-separated statements.
    ///
    /// When `query_id` is given the statement can be cancelled with
    /// [`DataEngine::cancel`] while it runs.
    async fn execute(
        &self,
        session: &Session,
        sql: &str,
        query_id: Option<QueryId>,
    ) -> EngineResult<QueryOutput>;

    /// Executes one statement with `$1..$n` bound by the driver.
    async fn execute_params(
        &self,
        session: &Session,
        sql: &str,
        params: &[Value],
    ) -> EngineResult<StatementResult>;

    /// Asks the server to cancel a running query. Returns false when no such
    /// query is running.
    async fn cancel(&self, session: &Session, query_id: QueryId) -> EngineResult<bool>;
}
