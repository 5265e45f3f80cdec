//! Core data types for the pgdeck engine
//!
//! Session handles, connection parameters and the normalized result contract
//! shared by the gateway, the HTTP layer and the saved-profile store.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::Sensitive;

/// Opaque handle for a registered pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a client-supplied handle. Anything that is not a UUID resolves to nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client-chosen identifier for a running query, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

/// PostgreSQL `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "disable" => Some(Self::Disable),
            "allow" => Some(Self::Allow),
            "prefer" => Some(Self::Prefer),
            "require" => Some(Self::Require),
            "verify-ca" => Some(Self::VerifyCa),
            "verify-full" => Some(Self::VerifyFull),
            _ => None,
        }
    }

    /// Mapping for the legacy boolean `ssl` flag.
    pub fn from_flag(ssl: bool) -> Self {
        if ssl {
            Self::Require
        } else {
            Self::Disable
        }
    }
}

/// Resolved connection parameters. Immutable once a pool has been opened with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Sensitive<String>,
    pub database: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ConnectionParams {
    /// `user@host:port/database`, never includes the password.
    pub fn display_name(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Pool tuning applied to every session pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub application_name: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            application_name: "pgdeck".to_string(),
        }
    }
}

/// Normalized scalar value
///
/// Compound database values never reach this type unflattened: the normalizer
/// renders them to `Text` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            Value::Text(s) => serde_json::Value::String(s),
        }
    }
}

/// A single row keyed by column name, in column order.
///
/// When a statement yields duplicate column names the later column's value wins
/// while `fields` keeps every name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Result of one executed statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    /// Leading command keyword, e.g. `SELECT`, `UPDATE`, `CREATE`.
    pub command: String,
    pub rows: Vec<Row>,
    pub fields: Vec<String>,
    /// Rows returned, or rows affected for DML.
    pub row_count: u64,
}

impl StatementResult {
    pub fn empty(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

/// Output of the gateway: one result, or an ordered command-tagged batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Single(StatementResult),
    Batch(Vec<StatementResult>),
}

impl QueryOutput {
    pub fn from_results(mut results: Vec<StatementResult>) -> Self {
        if results.len() == 1 {
            Self::Single(results.remove(0))
        } else {
            Self::Batch(results)
        }
    }

    pub fn results(&self) -> &[StatementResult] {
        match self {
            Self::Single(result) => std::slice::from_ref(result),
            Self::Batch(results) => results,
        }
    }

    pub fn into_results(self) -> Vec<StatementResult> {
        match self {
            Self::Single(result) => vec![result],
            Self::Batch(results) => results,
        }
    }

    /// The last statement's result, if any statement ran.
    pub fn into_last(self) -> Option<StatementResult> {
        self.into_results().pop()
    }

    /// First result carrying the given command tag.
    pub fn into_first_with(self, command: &str) -> Option<StatementResult> {
        self.into_results()
            .into_iter()
            .find(|r| r.command.eq_ignore_ascii_case(command))
    }

    /// Sum of `row_count` across all statements.
    pub fn total_row_count(&self) -> u64 {
        self.results().iter().map(|r| r.row_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(command: &str, n: u64) -> StatementResult {
        StatementResult {
            command: command.to_string(),
            row_count: n,
            ..Default::default()
        }
    }

    #[test]
    fn session_id_parse_rejects_garbage() {
        assert!(SessionId::parse("bogus-id").is_none());
        assert!(SessionId::parse("").is_none());

        let id = SessionId::new();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn ssl_mode_parsing() {
        assert_eq!(SslMode::parse("verify-full"), Some(SslMode::VerifyFull));
        assert_eq!(SslMode::parse("DISABLE"), Some(SslMode::Disable));
        assert_eq!(SslMode::parse("sometimes"), None);
        assert_eq!(SslMode::from_flag(true), SslMode::Require);

        let json = serde_json::to_string(&SslMode::VerifyCa).unwrap();
        assert_eq!(json, "\"verify-ca\"");
    }

    #[test]
    fn params_never_serialize_password() {
        let params = ConnectionParams {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: Sensitive::new("hunter2".into()),
            database: "postgres".into(),
            ssl_mode: SslMode::Disable,
        };

        let json = serde_json::to_string(&params).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{params:?}").contains("hunter2"));
        assert_eq!(params.display_name(), "postgres@localhost:5432/postgres");
    }

    #[test]
    fn non_finite_float_becomes_text() {
        let json: serde_json::Value = Value::Float(f64::NAN).into();
        assert_eq!(json, serde_json::json!("NaN"));

        let json: serde_json::Value = Value::Float(1.5).into();
        assert_eq!(json, serde_json::json!(1.5));
    }

    #[test]
    fn single_output_serializes_flat() {
        let output = QueryOutput::from_results(vec![tagged("SELECT", 0)]);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "SELECT", "rows": [], "fields": [], "rowCount": 0})
        );
    }

    #[test]
    fn batch_output_keeps_order() {
        let output = QueryOutput::from_results(vec![
            tagged("UPDATE", 3),
            tagged("SELECT", 1),
            tagged("SELECT", 2),
        ]);
        assert!(matches!(output, QueryOutput::Batch(_)));
        assert_eq!(output.total_row_count(), 6);

        let commands: Vec<_> = output.results().iter().map(|r| r.command.as_str()).collect();
        assert_eq!(commands, vec!["UPDATE", "SELECT", "SELECT"]);

        let first_select = output.clone().into_first_with("select").unwrap();
        assert_eq!(first_select.row_count, 1);
        assert_eq!(output.into_last().unwrap().row_count, 2);
    }
}
