//! Statement advisor port.

use crate::task::{
    domain::{CheckNamespace, CheckResult, CheckStatus, Engine, ErrorCode},
    ports::ExecutorError,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for advisor operations.
pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// One finding reported by the advisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    /// Severity.
    pub status: CheckStatus,
    /// Rule code, zero for generic findings.
    pub code: i32,
    /// Short summary.
    pub title: String,
    /// Details.
    pub content: String,
}

impl Advice {
    /// Creates a finding with code zero.
    #[must_use]
    pub fn new(status: CheckStatus, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            status,
            code: 0,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Sets the rule code.
    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }
}

impl From<Advice> for CheckResult {
    fn from(advice: Advice) -> Self {
        Self {
            status: advice.status,
            namespace: CheckNamespace::Advisor,
            code: advice.code,
            title: advice.title,
            content: advice.content,
        }
    }
}

/// Coarse kind of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Changes the schema.
    Ddl,
    /// Reads or changes rows.
    Dml,
    /// Creates a database.
    CreateDatabase,
    /// Drops a database.
    DropDatabase,
    /// Transaction control and everything else.
    Other,
}

/// One statement of a script together with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    /// Statement text.
    pub text: String,
    /// Statement kind.
    pub kind: StatementKind,
}

/// Parses and reviews SQL for one engine.
#[async_trait]
pub trait StatementAdvisor: Send + Sync {
    /// Returns the syntax errors in `statement`; empty when it parses.
    async fn check_syntax(&self, engine: Engine, statement: &str) -> AdvisorResult<Vec<Advice>>;

    /// Reviews `statement` against the SQL review rules.
    async fn review(&self, engine: Engine, statement: &str) -> AdvisorResult<Vec<Advice>>;

    /// Splits `statement` and classifies each part.
    async fn classify(
        &self,
        engine: Engine,
        statement: &str,
    ) -> AdvisorResult<Vec<ClassifiedStatement>>;
}

/// Errors returned by advisors.
#[derive(Debug, Clone, Error)]
pub enum AdvisorError {
    /// The advisor has no rules for the engine.
    #[error("statement advisor does not support {0}")]
    Unsupported(Engine),

    /// The statement could not be split into parts.
    #[error("failed to parse statement: {0}")]
    Parse(String),

    /// Advisor backend failure.
    #[error("statement advisor error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl AdvisorError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unsupported(_) => ErrorCode::NotImplemented,
            Self::Parse(_) => ErrorCode::Invalid,
            Self::Backend(_) => ErrorCode::Internal,
        }
    }
}

impl From<AdvisorError> for ExecutorError {
    fn from(err: AdvisorError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
