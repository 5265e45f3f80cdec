// SPDX-License-Identifier: Apache-2.0

//! Statement splitting and classification
//!
//! Input SQL is cut on top-level semicolons using the sqlparser tokenizer, so
//! semicolons inside string literals, quoted identifiers, dollar-quoted bodies
//! and comments never split a statement.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

/// One statement of a (possibly multi-statement) input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Statement text without the terminating semicolon.
    pub sql: String,
    /// Command tag the server reports for it, e.g. `SELECT`, `UPDATE`, `CREATE`.
    pub command: String,
    /// Whether the statement can produce a row set. Execution never depends on
    /// it; a zero-row result is only described for its fields when it is set.
    pub returns_rows: bool,
}

/// Commands whose execution can yield a row description.
const ROW_COMMANDS: &[&str] = &["SELECT", "SHOW", "EXPLAIN", "FETCH", "CALL", "EXECUTE"];

/// Splits `sql` into classified statements, dropping empty ones.
///
/// Input the tokenizer rejects (an unterminated literal, for instance) is
/// returned as a single statement so the server reports the real error.
pub fn split_sql_statements(sql: &str) -> Vec<SqlStatement> {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!(error = %e, "Tokenizer rejected input, running it as one statement");
            return fallback_single(sql);
        }
    };

    let offsets = LineOffsets::new(sql);
    let mut statements = Vec::new();
    let mut start = 0usize;
    let mut segment: Vec<&TokenWithSpan> = Vec::new();

    for token in &tokens {
        if token.token == Token::SemiColon {
            let end = offsets.byte_offset(sql, token.span.start);
            push_statement(&mut statements, &sql[start..end], &segment);
            start = end + 1;
            segment.clear();
        } else {
            segment.push(token);
        }
    }
    if start <= sql.len() {
        push_statement(&mut statements, &sql[start..], &segment);
    }

    statements
}

fn fallback_single(sql: &str) -> Vec<SqlStatement> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let command = trimmed
        .split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('(').to_ascii_uppercase())
        .unwrap_or_default();
    let returns_rows = ROW_COMMANDS.contains(&command.as_str());
    vec![SqlStatement {
        sql: trimmed.to_string(),
        command,
        returns_rows,
    }]
}

fn push_statement(out: &mut Vec<SqlStatement>, text: &str, tokens: &[&TokenWithSpan]) {
    let significant: Vec<&Token> = tokens
        .iter()
        .map(|t| &t.token)
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();
    if significant.is_empty() {
        return;
    }

    let command = command_tag(&significant);
    let returns_rows = ROW_COMMANDS.contains(&command.as_str())
        || significant
            .iter()
            .any(|t| matches!(t, Token::Word(w) if w.keyword == Keyword::RETURNING));

    out.push(SqlStatement {
        sql: text.trim().to_string(),
        command,
        returns_rows,
    });
}

/// Derives the command tag from the leading keyword.
///
/// `WITH` resolves to the first top-level data statement after the CTE list,
/// and `VALUES`/`TABLE` report as `SELECT`, matching the server's tags.
fn command_tag(tokens: &[&Token]) -> String {
    let first_word = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w),
        _ => None,
    });
    let Some(first) = first_word else {
        return String::new();
    };

    match first.keyword {
        Keyword::WITH => {
            let mut depth = 0i32;
            for token in tokens {
                match token {
                    Token::LParen => depth += 1,
                    Token::RParen => depth -= 1,
                    Token::Word(w) if depth == 0 => match w.keyword {
                        Keyword::SELECT
                        | Keyword::INSERT
                        | Keyword::UPDATE
                        | Keyword::DELETE
                        | Keyword::MERGE => return w.value.to_ascii_uppercase(),
                        Keyword::VALUES | Keyword::TABLE => return "SELECT".to_string(),
                        _ => {}
                    },
                    _ => {}
                }
            }
            "SELECT".to_string()
        }
        Keyword::VALUES | Keyword::TABLE => "SELECT".to_string(),
        _ => first.value.to_ascii_uppercase(),
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column) to byte offsets.
struct LineOffsets {
    starts: Vec<usize>,
}

impl LineOffsets {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn byte_offset(&self, sql: &str, location: Location) -> usize {
        let line = (location.line.max(1) - 1) as usize;
        let Some(&line_start) = self.starts.get(line) else {
            return sql.len();
        };
        let column = (location.column.max(1) - 1) as usize;
        sql[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
            .unwrap_or(sql.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(sql: &str) -> Vec<String> {
        split_sql_statements(sql)
            .into_iter()
            .map(|s| s.command)
            .collect()
    }

    #[test]
    fn test_single_statement() {
        let statements = split_sql_statements("SELECT 1 AS x");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "SELECT 1 AS x");
        assert_eq!(statements[0].command, "SELECT");
        assert!(statements[0].returns_rows);
    }

    #[test]
    fn test_trailing_semicolon_and_blank_statements() {
        let statements = split_sql_statements("  SELECT 1;  ;\n-- done\n");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "SELECT 1");
    }

    #[test]
    fn test_update_then_select() {
        let statements = split_sql_statements("UPDATE t SET a = 1 WHERE id = 2; SELECT * FROM t;");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "UPDATE t SET a = 1 WHERE id = 2");
        assert_eq!(statements[0].command, "UPDATE");
        assert!(!statements[0].returns_rows);
        assert_eq!(statements[1].sql, "SELECT * FROM t");
        assert_eq!(statements[1].command, "SELECT");
    }

    #[test]
    fn test_semicolons_inside_literals_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b', 'it''s; fine'); \
                   SELECT \"odd;name\" FROM t /* ; */; -- trailing ; comment\n\
                   SELECT 2";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO t VALUES ('a;b', 'it''s; fine')"
        );
        assert_eq!(statements[1].sql, "SELECT \"odd;name\" FROM t /* ; */");
        assert!(statements[2].sql.ends_with("SELECT 2"));
    }

    #[test]
    fn test_dollar_quoted_function_body() {
        let sql = "CREATE FUNCTION f() RETURNS int AS $$ BEGIN RETURN 1; END; $$ LANGUAGE plpgsql;\n\
                   SELECT f();";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].command, "CREATE");
        assert!(statements[0].sql.contains("RETURN 1; END;"));
        assert_eq!(statements[1].sql, "SELECT f()");
    }

    #[test]
    fn test_multibyte_text_keeps_offsets() {
        let statements = split_sql_statements("SELECT 'héllo'; SELECT 'wörld'");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "SELECT 'héllo'");
        assert_eq!(statements[1].sql, "SELECT 'wörld'");
    }

    #[test]
    fn test_command_tags() {
        assert_eq!(
            commands("create table t (id int); drop table t; insert into t values (1); delete from t"),
            vec!["CREATE", "DROP", "INSERT", "DELETE"]
        );
        assert_eq!(commands("VALUES (1), (2)"), vec!["SELECT"]);
        assert_eq!(commands("TABLE t"), vec!["SELECT"]);
        assert_eq!(commands("(SELECT 1)"), vec!["SELECT"]);
    }

    #[test]
    fn test_with_resolves_to_data_statement() {
        let sql = "WITH moved AS (DELETE FROM a RETURNING *) INSERT INTO b SELECT * FROM moved";
        let statements = split_sql_statements(sql);
        assert_eq!(statements[0].command, "INSERT");

        let sql = "WITH x AS (SELECT 1) SELECT * FROM x";
        assert_eq!(split_sql_statements(sql)[0].command, "SELECT");
    }

    #[test]
    fn test_returning_marks_rows() {
        let statements = split_sql_statements("UPDATE t SET a = 1 RETURNING id");
        assert!(statements[0].returns_rows);

        let statements = split_sql_statements("EXPLAIN SELECT 1; SHOW search_path");
        assert!(statements.iter().all(|s| s.returns_rows));
    }

    #[test]
    fn test_call_and_execute_can_return_rows() {
        let statements =
            split_sql_statements("CALL add_one(41); PREPARE q AS SELECT 1 AS x; EXECUTE q");
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].command, "CALL");
        assert!(statements[0].returns_rows);
        assert_eq!(statements[1].command, "PREPARE");
        assert!(!statements[1].returns_rows);
        assert_eq!(statements[2].command, "EXECUTE");
        assert!(statements[2].returns_rows);
    }

    #[test]
    fn test_unterminated_literal_falls_back_to_single_statement() {
        let statements = split_sql_statements("SELECT 'oops; SELECT 2");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].command, "SELECT");
        assert_eq!(statements[0].sql, "SELECT 'oops; SELECT 2");
    }

    #[test]
    fn test_empty_input() {
        assert!(split_sql_statements("").is_empty());
        assert!(split_sql_statements("  ;\n ; ").is_empty());
    }
}
