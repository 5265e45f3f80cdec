//! Query Handlers
//!
//! Endpoints that run client-supplied SQL. Each one picks the part of the
//! normalized output it needs; the gateway itself never special-cases callers.

use axum::extract::State;
use axum::Extension;
use serde::Deserialize;
use serde_json::json;

use crate::engine::types::{QueryId, QueryOutput, SessionId};
use crate::http::{ApiError, ApiJson, ApiResponse, ApiResult};
use crate::AppState;

/// Body shared by the raw SQL endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlRequest {
    pub query: Option<String>,
    pub query_type: Option<String>,
    /// Client-chosen id that `/cancel-query` can target while this runs.
    pub query_id: Option<QueryId>,
}

impl SqlRequest {
    fn sql(&self) -> Result<&str, ApiError> {
        self.query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ApiError::validation("Invalid data body: missing query"))
    }

    fn is_insert(&self) -> bool {
        self.query_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("insert"))
    }
}

async fn run(state: &AppState, session_id: SessionId, request: &SqlRequest) -> ApiResult<QueryOutput> {
    let sql = request.sql()?;
    Ok(state
        .gateway
        .execute(session_id, sql, request.query_id)
        .await?)
}

/// POST /query-table: `{rows, fields}` of the last statement
pub async fn query_table(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult {
    let result = run(&state, session_id, &request)
        .await?
        .into_last()
        .unwrap_or_default();
    Ok(ApiResponse::data(serde_json::to_value(result)?))
}

/// POST /update-table: `{rows, fields}` of the first SELECT in the batch
pub async fn update_table(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult {
    let result = run(&state, session_id, &request)
        .await?
        .into_first_with("SELECT")
        .ok_or_else(|| ApiError::validation("The statements returned no SELECT result"))?;
    Ok(ApiResponse::data(serde_json::to_value(result)?))
}

/// POST /mutate-dbData
///
/// For inserts `msg` carries the number of affected rows.
pub async fn mutate_db_data(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult {
    let output = run(&state, session_id, &request).await?;
    if request.is_insert() {
        Ok(ApiResponse::msg(output.total_row_count()))
    } else {
        Ok(ApiResponse::ok())
    }
}

/// POST /alter-table
pub async fn alter_table(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult {
    run(&state, session_id, &request).await?;
    Ok(ApiResponse::data(""))
}

/// POST /create-table
pub async fn create_table(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult {
    run(&state, session_id, &request).await?;
    Ok(ApiResponse::msg("Table created successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub query_id: Option<QueryId>,
}

/// POST /cancel-query
pub async fn cancel_query(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<CancelRequest>,
) -> ApiResult {
    let query_id = request
        .query_id
        .ok_or_else(|| ApiError::validation("Missing queryId"))?;

    let cancelled = state.gateway.cancel(session_id, query_id).await?;
    let msg = if cancelled {
        "Cancel requested"
    } else {
        "No running query with that id"
    };
    Ok(ApiResponse::msg(msg).with_data(json!({ "cancelled": cancelled })))
}
