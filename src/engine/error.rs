// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the pgdeck engine
//!
//! Every driver failure is mapped onto one of these variants, and every variant
//! belongs to exactly one [`ErrorKind`]: the stable classification clients see.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-facing error classification carried in every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Pool creation, acquire failure or acquire timeout.
    ConnectionError,
    /// SQL execution failure; carries the driver's SQLSTATE when available.
    QueryError,
    /// Malformed request body.
    ValidationError,
    /// Missing or unknown session.
    AuthError,
    /// Failure outside the database path (saved profile store, serialization).
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "ConnectionError",
            Self::QueryError => "QueryError",
            Self::ValidationError => "ValidationError",
            Self::AuthError => "AuthError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Unified error type for all engine operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Timed out after {timeout_ms}ms waiting for a database connection")]
    Timeout { timeout_ms: u64 },

    #[error("Session limit reached ({max_sessions} open sessions)")]
    CapacityReached { max_sessions: usize },

    #[error("Query failed: {message}")]
    QueryFailed {
        code: Option<String>,
        message: String,
    },

    #[error("Session not found or expired: {session_id}. Connect to the db first")]
    SessionNotFound { session_id: String },

    #[error("Invalid request: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn query_failed(code: Option<String>, msg: impl Into<String>) -> Self {
        Self::QueryFailed {
            code,
            message: msg.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { session_id: id.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// The envelope kind this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::CapacityReached { .. } => {
                ErrorKind::ConnectionError
            }
            Self::QueryFailed { .. } => ErrorKind::QueryError,
            Self::SessionNotFound { .. } => ErrorKind::AuthError,
            Self::ValidationError { .. } => ErrorKind::ValidationError,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    /// SQLSTATE reported by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::QueryFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
