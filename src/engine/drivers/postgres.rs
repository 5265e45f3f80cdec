// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements the DataEngine trait for PostgreSQL using SQLx.
//!
//! ## Statement execution
//!
//! Raw SQL is split into statements and run one at a time over the simple
//! query protocol, so every value comes back in the server's text rendering.
//! A batch of more than one statement runs inside a single transaction on one
//! pooled connection and is rolled back on the first failure.
//!
//! Parameterized statements use the extended protocol with driver-bound values.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgColumn, PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgQueryResult, PgRow,
    PgSslMode, Postgres,
};
use sqlx::{Connection, Either, Executor, Statement};
use tracing::instrument;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::normalizer::{self, bind_param};
use crate::engine::registry::Session;
use crate::engine::sql_statements::{split_sql_statements, SqlStatement};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ConnectionParams, PoolSettings, QueryId, QueryOutput, SessionId, SslMode, StatementResult,
    Value,
};
use crate::metrics;

type ActiveQueries = Arc<Mutex<HashMap<(SessionId, QueryId), i32>>>;

/// PostgreSQL driver implementation
#[derive(Default)]
pub struct PostgresDriver {
    /// Running cancellable queries ((session, query_id) -> backend_pid)
    active_queries: ActiveQueries,
}

/// Removes a tracked query when execution ends, however it ends.
struct ActiveQueryGuard {
    key: (SessionId, QueryId),
    active: ActiveQueries,
}

impl Drop for ActiveQueryGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

impl PostgresDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds connect options from resolved params
    pub fn connect_options(params: &ConnectionParams, settings: &PoolSettings) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .database(&params.database)
            .ssl_mode(ssl_mode(params.ssl_mode))
            .application_name(&settings.application_name);

        if !params.password.expose().is_empty() {
            options = options.password(params.password.expose());
        }
        options
    }

    async fn acquire(session: &Session) -> EngineResult<PoolConnection<Postgres>> {
        session.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => {
                metrics::record_timeout();
                EngineError::Timeout {
                    timeout_ms: session.pool.options().get_acquire_timeout().as_millis() as u64,
                }
            }
            other => EngineError::connection_failed(other.to_string()),
        })
    }

    async fn track(
        &self,
        conn: &mut PgConnection,
        session: SessionId,
        query_id: QueryId,
    ) -> EngineResult<ActiveQueryGuard> {
        let backend_pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await
            .map_err(map_query_error)?;

        let key = (session, query_id);
        self.active_queries.lock().insert(key, backend_pid);
        Ok(ActiveQueryGuard {
            key,
            active: Arc::clone(&self.active_queries),
        })
    }

    /// Backend pid of a tracked query, if it is still running.
    fn tracked_pid(&self, key: &(SessionId, QueryId)) -> Option<i32> {
        self.active_queries.lock().get(key).copied()
    }

    /// Runs one statement and normalizes its result.
    ///
    /// Every statement is fetched as a row stream, whatever its command: `CALL`
    /// with output arguments or `EXECUTE` of a prepared query return rows too.
    async fn run_statement(
        conn: &mut PgConnection,
        statement: &SqlStatement,
    ) -> EngineResult<StatementResult> {
        let (rows, rows_affected) =
            collect_results((&mut *conn).fetch_many(sqlx::raw_sql(&statement.sql))).await?;

        Self::statement_result(conn, &statement.sql, statement, rows, rows_affected).await
    }

    /// Builds the normalized result. A zero-row result of a row-producing
    /// statement is described so its field list is still reported.
    async fn statement_result(
        conn: &mut PgConnection,
        sql: &str,
        statement: &SqlStatement,
        rows: Vec<PgRow>,
        rows_affected: u64,
    ) -> EngineResult<StatementResult> {
        let described = if rows.is_empty() && statement.returns_rows {
            Some(describe_columns(conn, sql).await?)
        } else {
            None
        };

        let row_count = if rows.is_empty() {
            rows_affected
        } else {
            rows.len() as u64
        };
        let (rows, fields) = normalizer::normalize(&rows, described.as_deref());
        Ok(StatementResult {
            command: statement.command.clone(),
            row_count,
            rows,
            fields,
        })
    }
}

/// Drains a result stream into its rows and the total affected-row count.
async fn collect_results(
    mut stream: BoxStream<'_, Result<Either<PgQueryResult, PgRow>, sqlx::Error>>,
) -> EngineResult<(Vec<PgRow>, u64)> {
    let mut rows = Vec::new();
    let mut rows_affected = 0;
    while let Some(item) = stream.try_next().await.map_err(map_query_error)? {
        match item {
            Either::Left(done) => rows_affected += done.rows_affected(),
            Either::Right(row) => rows.push(row),
        }
    }
    Ok((rows, rows_affected))
}

/// Column descriptors of `sql`, read from a fresh server-side prepare.
///
/// The connection's statement cache is emptied afterwards: a cached entry
/// keeps its old column list after the table it reads is altered.
async fn describe_columns(conn: &mut PgConnection, sql: &str) -> EngineResult<Vec<PgColumn>> {
    let columns = {
        let prepared = (&mut *conn).prepare(sql).await.map_err(map_query_error)?;
        prepared.columns().to_vec()
    };
    conn.clear_cached_statements()
        .await
        .map_err(map_query_error)?;
    Ok(columns)
}

#[async_trait]
impl DataEngine for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    #[instrument(
        skip(self, params, settings),
        fields(host = %params.host, port = params.port, database = %params.database)
    )]
    async fn open_pool(
        &self,
        params: &ConnectionParams,
        settings: &PoolSettings,
    ) -> EngineResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(0)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .connect_lazy_with(Self::connect_options(params, settings));

        match pool.acquire().await {
            Ok(conn) => {
                drop(conn);
                Ok(pool)
            }
            Err(e) => {
                pool.close().await;
                Err(map_connect_error(e, settings))
            }
        }
    }

    #[instrument(skip(self, session, sql), fields(session_id = %session.id, sql_len = sql.len()))]
    async fn execute(
        &self,
        session: &Session,
        sql: &str,
        query_id: Option<QueryId>,
    ) -> EngineResult<QueryOutput> {
        let statements = split_sql_statements(sql);
        let mut conn = Self::acquire(session).await?;

        let _tracked = match query_id {
            Some(query_id) => Some(self.track(&mut conn, session.id, query_id).await?),
            None => None,
        };

        if statements.len() <= 1 {
            let mut results = Vec::with_capacity(1);
            if let Some(statement) = statements.first() {
                results.push(Self::run_statement(&mut conn, statement).await?);
            }
            return Ok(QueryOutput::from_results(results));
        }

        let mut tx = conn.begin().await.map_err(map_query_error)?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in &statements {
            match Self::run_statement(&mut tx, statement).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "Rollback after failed statement failed");
                    }
                    return Err(err);
                }
            }
        }
        tx.commit().await.map_err(map_query_error)?;

        Ok(QueryOutput::Batch(results))
    }

    #[instrument(skip(self, session, sql, params), fields(session_id = %session.id, params = params.len()))]
    async fn execute_params(
        &self,
        session: &Session,
        sql: &str,
        params: &[Value],
    ) -> EngineResult<StatementResult> {
        let statement = split_sql_statements(sql)
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::validation("Query is empty"))?;
        let mut conn = Self::acquire(session).await?;

        // Not persisted in the statement cache, for the same reason as `describe_columns`.
        let mut query = sqlx::query(sql).persistent(false);
        for param in params {
            query = bind_param(query, param);
        }

        let (rows, rows_affected) = collect_results((&mut *conn).fetch_many(query)).await?;
        Self::statement_result(&mut conn, sql, &statement, rows, rows_affected).await
    }

    #[instrument(skip(self, session), fields(session_id = %session.id, query_id = %query_id.0))]
    async fn cancel(&self, session: &Session, query_id: QueryId) -> EngineResult<bool> {
        let key = (session.id, query_id);
        if self.tracked_pid(&key).is_none() {
            return Ok(false);
        }

        let mut conn = Self::acquire(session).await?;

        // The query may have finished while we waited for a connection, and its
        // backend may already be serving another request.
        let Some(backend_pid) = self.tracked_pid(&key) else {
            return Ok(false);
        };
        let cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(backend_pid)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_query_error)?;

        Ok(cancelled)
    }
}

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

/// Classifies an error raised while running SQL on an acquired connection.
pub(crate) fn map_query_error(e: sqlx::Error) -> EngineError {
    match e {
        sqlx::Error::Database(db) => {
            EngineError::query_failed(db.code().map(|c| c.into_owned()), db.message())
        }
        other @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => EngineError::connection_failed(other.to_string()),
        other => EngineError::query_failed(None, other.to_string()),
    }
}

/// Classifies an error raised while opening a pool. Every failure here is a
/// connection failure, including server-side rejections such as bad passwords.
fn map_connect_error(e: sqlx::Error, settings: &PoolSettings) -> EngineError {
    match e {
        sqlx::Error::Database(db) => EngineError::connection_failed(db.message()),
        sqlx::Error::PoolTimedOut => EngineError::connection_failed(format!(
            "Timed out after {}ms connecting to the server",
            settings.acquire_timeout.as_millis()
        )),
        other => EngineError::connection_failed(other.to_string()),
    }
}
