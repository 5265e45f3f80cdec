//! Role administration handlers

use axum::extract::State;
use axum::Extension;
use serde::Deserialize;
use tracing::instrument;

use crate::engine::sql_generator::{self, RoleDefinition};
use crate::engine::types::SessionId;
use crate::http::{ApiJson, ApiResponse, ApiResult};
use crate::AppState;

/// POST /create-role
#[instrument(skip_all, fields(session_id = %session_id, role = %definition.role_name))]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(definition): ApiJson<RoleDefinition>,
) -> ApiResult {
    let sql = sql_generator::create_role(&definition)?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Role created"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRoleRequest {
    pub role_name: String,
    #[serde(default)]
    pub if_exists: bool,
}

/// POST /drop-role
#[instrument(skip_all, fields(session_id = %session_id, role = %request.role_name))]
pub async fn drop_role(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<DropRoleRequest>,
) -> ApiResult {
    let sql = sql_generator::drop_role(&request.role_name, request.if_exists)?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Role dropped"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignOwnedRequest {
    pub old_role: String,
    pub new_role: String,
}

/// POST /reassign-owned
pub async fn reassign_owned(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<ReassignOwnedRequest>,
) -> ApiResult {
    let sql = sql_generator::reassign_owned(&request.old_role, &request.new_role)?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Ownership reassigned"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOwnedRequest {
    pub role_name: String,
    #[serde(default)]
    pub cascade: bool,
}

/// POST /drop-owned
pub async fn drop_owned(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    ApiJson(request): ApiJson<DropOwnedRequest>,
) -> ApiResult {
    let sql = sql_generator::drop_owned(&request.role_name, request.cascade)?;
    state.gateway.execute(session_id, &sql, None).await?;
    Ok(ApiResponse::msg("Owned objects dropped"))
}
