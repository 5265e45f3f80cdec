// SPDX-License-Identifier: Apache-2.0

//! Response envelope and error-to-response mapping
//!
//! Every response body is `{msg, errorMsg, data}`. Errors add `errorKind` and,
//! for query errors, the SQLSTATE as `errorCode`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::engine::error::{EngineError, ErrorKind};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub msg: Option<JsonValue>,
    pub error_msg: Option<String>,
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ApiResponse {
    /// Success with no payload: `{msg: null, errorMsg: null, data: null}`
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn data(data: impl Into<JsonValue>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn msg(msg: impl Into<JsonValue>) -> Self {
        Self {
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<JsonValue>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Handler error. Wraps the engine error so every failure keeps one kind.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

pub type ApiResult<T = ApiResponse> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(EngineError::validation(message))
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(EngineError::internal(format!("Failed to serialize response: {}", err)))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::QueryError => StatusCode::BAD_REQUEST,
        ErrorKind::AuthError => StatusCode::UNAUTHORIZED,
        ErrorKind::ConnectionError => StatusCode::BAD_GATEWAY,
        ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::InternalError => tracing::error!(error = %self.0, "Request failed"),
            ErrorKind::ConnectionError => tracing::warn!(error = %self.0, "Request failed"),
            _ => tracing::debug!(error = %self.0, kind = kind.as_str(), "Request rejected"),
        }

        let body = ApiResponse {
            error_msg: Some(self.0.to_string()),
            error_kind: Some(kind),
            error_code: self.0.code().map(str::to_string),
            ..ApiResponse::default()
        };
        (status_for(kind), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::QueryError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::AuthError), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::ConnectionError), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::ok()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"msg": null, "errorMsg": null, "data": null})
        );

        let json = serde_json::to_value(ApiResponse::msg(3)).unwrap();
        assert_eq!(json["msg"], 3);
    }

    #[test]
    fn test_query_error_carries_code() {
        let err = ApiError::from(EngineError::query_failed(
            Some("42P01".into()),
            "relation \"nope\" does not exist",
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
