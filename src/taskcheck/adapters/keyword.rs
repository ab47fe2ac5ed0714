//! Keyword-based statement advisor.
//!
//! Statements are split on `;` and judged by their leading keywords, so
//! string literals containing `;` are not supported. It is enough for the
//! in-memory driver and for tests; production deployments plug in a real
//! parser behind the same port.

use crate::taskcheck::ports::{
    Advice, AdvisorError, AdvisorResult, ClassifiedStatement, StatementAdvisor, StatementKind,
};
use crate::task::domain::{CheckStatus, Engine};
use async_trait::async_trait;

/// Rule code for a statement that does not parse.
pub const SYNTAX_ERROR: i32 = 201;
/// Rule code for `UPDATE` or `DELETE` without a `WHERE` clause.
pub const WHERE_REQUIRED: i32 = 202;
/// Rule code for `SELECT *`.
pub const NO_SELECT_ALL: i32 = 203;
/// Rule code for dropping a table.
pub const DROP_TABLE: i32 = 204;

const KNOWN_KEYWORDS: &[&str] = &[
    "ALTER", "BEGIN", "COMMIT", "CREATE", "DELETE", "DROP", "EXPLAIN", "GRANT", "INSERT",
    "MERGE", "RENAME", "REPLACE", "REVOKE", "ROLLBACK", "SELECT", "SET", "TRUNCATE", "UPDATE",
    "WITH",
];

/// Advisor judging statements by their leading keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordStatementAdvisor;

impl KeywordStatementAdvisor {
    /// Creates the advisor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn ensure_supported(engine: Engine) -> AdvisorResult<()> {
    if engine.supports_syntax_check() {
        Ok(())
    } else {
        Err(AdvisorError::Unsupported(engine))
    }
}

fn split(statement: &str) -> impl Iterator<Item = &str> {
    statement
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

fn keywords(statement: &str) -> Vec<String> {
    statement
        .split_whitespace()
        .take(2)
        .map(str::to_ascii_uppercase)
        .collect()
}

fn syntax_problem(statement: &str) -> Option<String> {
    let mut depth = 0_i64;
    let mut quoted: Option<char> = None;
    for c in statement.chars() {
        match (quoted, c) {
            (Some(open), _) if c == open => quoted = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quoted = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Some("unbalanced parentheses".to_owned());
                }
            }
            (None, _) => {}
        }
    }
    if quoted.is_some() {
        return Some("unterminated quoted string".to_owned());
    }
    if depth != 0 {
        return Some("unbalanced parentheses".to_owned());
    }
    let leading = keywords(statement).into_iter().next().unwrap_or_default();
    if KNOWN_KEYWORDS.contains(&leading.as_str()) {
        None
    } else {
        Some(format!("unknown statement {leading:?}"))
    }
}

fn classify_one(statement: &str) -> StatementKind {
    match keywords(statement).as_slice() {
        [first, second] if first == "CREATE" && second == "DATABASE" => {
            StatementKind::CreateDatabase
        }
        [first, second] if first == "DROP" && second == "DATABASE" => StatementKind::DropDatabase,
        [first, ..] => match first.as_str() {
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => StatementKind::Ddl,
            "INSERT" | "UPDATE" | "DELETE" | "SELECT" | "REPLACE" | "MERGE" | "WITH" => {
                StatementKind::Dml
            }
            _ => StatementKind::Other,
        },
        [] => StatementKind::Other,
    }
}

fn review_one(statement: &str) -> Option<Advice> {
    let words = keywords(statement);
    let leading = words.first().map_or("", String::as_str);
    let has_where = statement
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("WHERE"));
    if matches!(leading, "UPDATE" | "DELETE") && !has_where {
        return Some(
            Advice::new(
                CheckStatus::Error,
                "WHERE clause is required",
                format!("\"{statement}\" changes every row"),
            )
            .with_code(WHERE_REQUIRED),
        );
    }
    if leading == "SELECT" && statement.split_whitespace().nth(1) == Some("*") {
        return Some(
            Advice::new(
                CheckStatus::Warn,
                "Avoid SELECT *",
                format!("\"{statement}\" selects every column"),
            )
            .with_code(NO_SELECT_ALL),
        );
    }
    if leading == "DROP" && words.get(1).is_some_and(|second| second == "TABLE") {
        return Some(
            Advice::new(
                CheckStatus::Warn,
                "Plan to drop table",
                format!("\"{statement}\" drops a table"),
            )
            .with_code(DROP_TABLE),
        );
    }
    None
}

#[async_trait]
impl StatementAdvisor for KeywordStatementAdvisor {
    async fn check_syntax(&self, engine: Engine, statement: &str) -> AdvisorResult<Vec<Advice>> {
        ensure_supported(engine)?;
        if split(statement).next().is_none() {
            return Ok(vec![
                Advice::new(CheckStatus::Error, "Syntax error", "statement is empty")
                    .with_code(SYNTAX_ERROR),
            ]);
        }
        Ok(split(statement)
            .filter_map(|part| {
                syntax_problem(part).map(|problem| {
                    let content = format!("\"{part}\": {problem}");
                    Advice::new(CheckStatus::Error, "Syntax error", content).with_code(SYNTAX_ERROR)
                })
            })
            .collect())
    }

    async fn review(&self, engine: Engine, statement: &str) -> AdvisorResult<Vec<Advice>> {
        ensure_supported(engine)?;
        Ok(split(statement).filter_map(review_one).collect())
    }

    async fn classify(
        &self,
        engine: Engine,
        statement: &str,
    ) -> AdvisorResult<Vec<ClassifiedStatement>> {
        ensure_supported(engine)?;
        Ok(split(statement)
            .map(|part| ClassifiedStatement {
                text: part.to_owned(),
                kind: classify_one(part),
            })
            .collect())
    }
}
