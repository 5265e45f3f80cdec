// SPDX-License-Identifier: Apache-2.0

//! Mutation Handlers
//!
//! Generated DDL/DML for tables, rows and indexes. Identifiers are quoted by
//! the SQL generator; row ids are bound as parameters.

use axum::extract::State;
use axum::Extension;
use serde::Deserialize;
use tracing::instrument;

use crate::engine::sql_generator::{self, IndexDefinition};
use crate::engine::types::{SessionId, Value};
use crate::http::{ApiError, ApiJson, ApiResponse, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTableRequest {
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub cascade: bool,
}

/// POST /drop-table
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn drop_table(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<DropTableRequest>,
) -> ApiResult {
    let sql = sql_generator::drop_table(
        request.schema.as_deref(),
        &request.table_name,
        request.cascade,
    )?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Table dropped"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRowRequest {
    pub target_table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// The row's `ctid`, e.g. `(0,1)`
    pub row_id: String,
}

/// POST /delete-row
///
/// `msg` carries the number of deleted rows.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn delete_row(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<DeleteRowRequest>,
) -> ApiResult {
    let row_id = request.row_id.trim();
    if row_id.is_empty() {
        return Err(ApiError::validation("Missing rowId"));
    }

    let sql = sql_generator::delete_row(request.schema.as_deref(), &request.target_table)?;
    let result = state
        .gateway
        .execute_params(session_id, &sql, &[Value::Text(row_id.to_string())])
        .await?;
    Ok(ApiResponse::msg(result.row_count))
}

/// POST /create-index
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn create_index(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(definition): ApiJson<IndexDefinition>,
) -> ApiResult {
    let sql = sql_generator::create_index(&definition)?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Index created"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropIndexRequest {
    pub index_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub cascade: bool,
    #[serde(default)]
    pub concurrently: bool,
}

/// POST /drop-index
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn drop_index(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<DropIndexRequest>,
) -> ApiResult {
    let sql = sql_generator::drop_index(
        request.schema.as_deref(),
        &request.index_name,
        request.cascade,
        request.concurrently,
    )?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Index dropped"))
}
