//! SQL Generator
//!
//! Builds the DDL/DML statements behind the admin endpoints. Identifiers and
//! literals that cannot be bound as parameters go through the quoting helpers
//! here; everything else is left to the driver's parameter binding.

use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};

/// Quotes an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes `schema.name`, or just `name` when no schema is given.
pub fn quote_qualified(schema: Option<&str>, name: &str) -> String {
    match schema.filter(|s| !s.is_empty()) {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
        None => quote_ident(name),
    }
}

/// Quotes a string literal. Backslashes switch to the `E''` form so the
/// result is the same under either `standard_conforming_strings` setting.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if value.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

fn require_ident<'a>(what: &str, name: &'a str) -> EngineResult<&'a str> {
    if name.trim().is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    if name.contains('\0') {
        return Err(EngineError::validation(format!("{what} contains a NUL byte")));
    }
    Ok(name)
}

fn cascade_clause(cascade: bool) -> &'static str {
    if cascade {
        "CASCADE"
    } else {
        "RESTRICT"
    }
}

pub fn drop_table(schema: Option<&str>, table: &str, cascade: bool) -> EngineResult<String> {
    let table = require_ident("Table name", table)?;
    Ok(format!(
        "DROP TABLE {} {}",
        quote_qualified(schema, table),
        cascade_clause(cascade)
    ))
}

/// Deletes one row by its physical location. The `ctid` is bound as `$1`.
pub fn delete_row(schema: Option<&str>, table: &str) -> EngineResult<String> {
    let table = require_ident("Table name", table)?;
    Ok(format!(
        "DELETE FROM {} WHERE ctid = $1::tid",
        quote_qualified(schema, table)
    ))
}

/// Index access methods shipped with PostgreSQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMethod {
    #[default]
    Btree,
    Hash,
    Gist,
    Spgist,
    Gin,
    Brin,
}

impl IndexMethod {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Btree => "btree",
            Self::Hash => "hash",
            Self::Gist => "gist",
            Self::Spgist => "spgist",
            Self::Gin => "gin",
            Self::Brin => "brin",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub index_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub table_name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub method: IndexMethod,
    #[serde(default)]
    pub concurrently: bool,
}

pub fn create_index(def: &IndexDefinition) -> EngineResult<String> {
    let index = require_ident("Index name", &def.index_name)?;
    let table = require_ident("Table name", &def.table_name)?;
    if def.columns.is_empty() {
        return Err(EngineError::validation("An index needs at least one column"));
    }
    let columns = def
        .columns
        .iter()
        .map(|c| require_ident("Column name", c).map(quote_ident))
        .collect::<EngineResult<Vec<_>>>()?;

    let mut sql = String::from("CREATE ");
    if def.unique {
        sql.push_str("UNIQUE ");
    }
    sql.push_str("INDEX ");
    if def.concurrently {
        sql.push_str("CONCURRENTLY ");
    }
    sql.push_str(&format!(
        "{} ON {} USING {} ({})",
        quote_ident(index),
        quote_qualified(def.schema.as_deref(), table),
        def.method.as_sql(),
        columns.join(", ")
    ));
    Ok(sql)
}

pub fn drop_index(
    schema: Option<&str>,
    index: &str,
    cascade: bool,
    concurrently: bool,
) -> EngineResult<String> {
    let index = require_ident("Index name", index)?;
    let concurrently = if concurrently { "CONCURRENTLY " } else { "" };
    Ok(format!(
        "DROP INDEX {}{} {}",
        concurrently,
        quote_qualified(schema, index),
        cascade_clause(cascade)
    ))
}

/// Attributes for `CREATE ROLE`. Unset flags keep the server defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub role_name: String,
    #[serde(default)]
    pub login: Option<bool>,
    #[serde(default)]
    pub superuser: Option<bool>,
    #[serde(default)]
    pub create_db: Option<bool>,
    #[serde(default)]
    pub create_role: Option<bool>,
    #[serde(default)]
    pub inherit: Option<bool>,
    #[serde(default)]
    pub replication: Option<bool>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub connection_limit: Option<i32>,
    #[serde(default)]
    pub valid_until: Option<String>,
}

pub fn create_role(def: &RoleDefinition) -> EngineResult<String> {
    let role = require_ident("Role name", &def.role_name)?;
    let flags = [
        (def.superuser, "SUPERUSER"),
        (def.create_db, "CREATEDB"),
        (def.create_role, "CREATEROLE"),
        (def.inherit, "INHERIT"),
        (def.login, "LOGIN"),
        (def.replication, "REPLICATION"),
    ];

    let mut options: Vec<String> = flags
        .iter()
        .filter_map(|(value, keyword)| {
            value.map(|on| {
                if on {
                    keyword.to_string()
                } else {
                    format!("NO{keyword}")
                }
            })
        })
        .collect();

    if let Some(limit) = def.connection_limit {
        options.push(format!("CONNECTION LIMIT {limit}"));
    }
    if let Some(password) = &def.password {
        options.push(format!("PASSWORD {}", quote_literal(password)));
    }
    if let Some(valid_until) = def.valid_until.as_deref().filter(|v| !v.is_empty()) {
        options.push(format!("VALID UNTIL {}", quote_literal(valid_until)));
    }

    let mut sql = format!("CREATE ROLE {}", quote_ident(role));
    if !options.is_empty() {
        sql.push_str(" WITH ");
        sql.push_str(&options.join(" "));
    }
    Ok(sql)
}

pub fn drop_role(role: &str, if_exists: bool) -> EngineResult<String> {
    let role = require_ident("Role name", role)?;
    let if_exists = if if_exists { "IF EXISTS " } else { "" };
    Ok(format!("DROP ROLE {}{}", if_exists, quote_ident(role)))
}

pub fn reassign_owned(old_role: &str, new_role: &str) -> EngineResult<String> {
    let old_role = require_ident("Old role", old_role)?;
    let new_role = require_ident("New role", new_role)?;
    Ok(format!(
        "REASSIGN OWNED BY {} TO {}",
        quote_ident(old_role),
        quote_ident(new_role)
    ))
}

pub fn drop_owned(role: &str, cascade: bool) -> EngineResult<String> {
    let role = require_ident("Role name", role)?;
    Ok(format!(
        "DROP OWNED BY {} {}",
        quote_ident(role),
        cascade_clause(cascade)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_qualified(Some("public"), "users"), "\"public\".\"users\"");
        assert_eq!(quote_qualified(Some(""), "users"), "\"users\"");
        assert_eq!(quote_qualified(None, "users"), "\"users\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("back\\slash"), "E'back\\\\slash'");
    }

    #[test]
    fn test_drop_table() {
        assert_eq!(
            drop_table(Some("public"), "orders", true).unwrap(),
            "DROP TABLE \"public\".\"orders\" CASCADE"
        );
        assert_eq!(
            drop_table(None, "orders; DROP TABLE x", false).unwrap(),
            "DROP TABLE \"orders; DROP TABLE x\" RESTRICT"
        );
        let err = drop_table(None, "  ", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_delete_row_binds_ctid() {
        assert_eq!(
            delete_row(Some("app"), "items").unwrap(),
            "DELETE FROM \"app\".\"items\" WHERE ctid = $1::tid"
        );
    }

    #[test]
    fn test_table_name_is_one_raw_identifier() {
        // Schema and table travel separately; a pre-quoted or dotted name is
        // taken literally rather than re-parsed.
        assert_eq!(
            delete_row(Some("app"), "\"items\"").unwrap(),
            "DELETE FROM \"app\".\"\"\"items\"\"\" WHERE ctid = $1::tid"
        );
        assert_eq!(
            drop_table(None, "app.items", false).unwrap(),
            "DROP TABLE \"app.items\" RESTRICT"
        );
    }

    #[test]
    fn test_create_index() {
        let def = IndexDefinition {
            index_name: "idx_orders_customer".into(),
            schema: Some("public".into()),
            table_name: "orders".into(),
            columns: vec!["customer_id".into(), "created_at".into()],
            unique: true,
            method: IndexMethod::Btree,
            concurrently: true,
        };
        assert_eq!(
            create_index(&def).unwrap(),
            "CREATE UNIQUE INDEX CONCURRENTLY \"idx_orders_customer\" ON \"public\".\"orders\" \
             USING btree (\"customer_id\", \"created_at\")"
        );

        let empty = IndexDefinition {
            columns: vec![],
            ..def
        };
        assert!(create_index(&empty).is_err());
    }

    #[test]
    fn test_index_method_rejects_unknown() {
        let parsed: Result<IndexMethod, _> = serde_json::from_str("\"gin\"");
        assert_eq!(parsed.unwrap(), IndexMethod::Gin);
        let parsed: Result<IndexMethod, _> = serde_json::from_str("\"btree; DROP\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_drop_index() {
        assert_eq!(
            drop_index(Some("public"), "idx", false, true).unwrap(),
            "DROP INDEX CONCURRENTLY \"public\".\"idx\" RESTRICT"
        );
    }

    #[test]
    fn test_create_role() {
        let def = RoleDefinition {
            role_name: "reporter".into(),
            login: Some(true),
            superuser: Some(false),
            password: Some("s3cr'et".into()),
            connection_limit: Some(5),
            ..Default::default()
        };
        assert_eq!(
            create_role(&def).unwrap(),
            "CREATE ROLE \"reporter\" WITH NOSUPERUSER LOGIN CONNECTION LIMIT 5 PASSWORD 's3cr''et'"
        );

        let bare = RoleDefinition {
            role_name: "plain".into(),
            ..Default::default()
        };
        assert_eq!(create_role(&bare).unwrap(), "CREATE ROLE \"plain\"");
    }

    #[test]
    fn test_role_statements() {
        assert_eq!(drop_role("old", true).unwrap(), "DROP ROLE IF EXISTS \"old\"");
        assert_eq!(
            reassign_owned("old", "new").unwrap(),
            "REASSIGN OWNED BY \"old\" TO \"new\""
        );
        assert_eq!(drop_owned("old", false).unwrap(), "DROP OWNED BY \"old\" RESTRICT");
        assert!(reassign_owned("", "new").is_err());
    }
}
