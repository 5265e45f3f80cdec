// SPDX-License-Identifier: Apache-2.0

//! Session gate
//!
//! Middleware in front of every gated route. It reads `connectionId` from the
//! JSON body, checks that it names a live session, and hands the resolved
//! [`SessionId`] to the handler as a request extension. The body is forwarded
//! byte for byte.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::error::ApiError;
use crate::engine::error::EngineError;
use crate::engine::types::SessionId;
use crate::AppState;

/// Same ceiling axum applies to `Json` bodies by default.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateBody {
    #[serde(default)]
    connection_id: Option<JsonValue>,
}

pub async fn session_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::validation("Invalid data body"))?;

    let session_id = connection_id(&bytes)?;
    if !state.sessions.session_exists(session_id).await {
        tracing::debug!(session_id = %session_id, path = %parts.uri.path(), "Unknown session");
        return Err(EngineError::session_not_found(session_id.to_string()).into());
    }

    parts.extensions.insert(session_id);
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Missing body or field is a validation error; an id that is not a UUID
/// string is treated like an unknown session.
fn connection_id(body: &[u8]) -> Result<SessionId, ApiError> {
    let parsed: GateBody =
        serde_json::from_slice(body).map_err(|_| ApiError::validation("Invalid data body"))?;

    let raw = parsed
        .connection_id
        .ok_or_else(|| ApiError::validation("Missing connectionId. Connect to the db first"))?;

    raw.as_str()
        .and_then(SessionId::parse)
        .ok_or_else(|| EngineError::session_not_found(raw.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;

    fn kind(body: &str) -> ErrorKind {
        connection_id(body.as_bytes()).unwrap_err().0.kind()
    }

    #[test]
    fn test_missing_or_unparsable_is_validation() {
        assert_eq!(kind(""), ErrorKind::ValidationError);
        assert_eq!(kind("not json"), ErrorKind::ValidationError);
        assert_eq!(kind("[1, 2]"), ErrorKind::ValidationError);
        assert_eq!(kind(r#"{"query": "SELECT 1"}"#), ErrorKind::ValidationError);
        assert_eq!(kind(r#"{"connectionId": null}"#), ErrorKind::ValidationError);
    }

    #[test]
    fn test_malformed_id_is_auth() {
        assert_eq!(kind(r#"{"connectionId": "bogus-id"}"#), ErrorKind::AuthError);
        assert_eq!(kind(r#"{"connectionId": 42}"#), ErrorKind::AuthError);
    }

    #[test]
    fn test_valid_id_parses() {
        let id = SessionId::new();
        let body = format!(r#"{{"connectionId": "{id}", "query": "SELECT 1"}}"#);
        assert_eq!(connection_id(body.as_bytes()).unwrap(), id);
    }
}
