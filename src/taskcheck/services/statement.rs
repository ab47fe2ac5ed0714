//! Statement checks backed by a [`StatementAdvisor`].

use crate::taskcheck::ports::{ClassifiedStatement, StatementAdvisor, StatementKind};
use crate::task::{
    domain::{CheckResult, CheckStatus, ErrorCode, Task, TaskCheckRun, TaskPayload},
    ports::{ExecutorError, TaskCheckExecutor},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Returns the statement under check: the run's own copy, else the task's.
fn statement_of<'a>(check_run: &'a TaskCheckRun, task: &'a Task) -> Result<&'a str, ExecutorError> {
    check_run
        .statement
        .as_deref()
        .or_else(|| task.payload().statement())
        .ok_or_else(|| {
            ExecutorError::invalid(format!("task {} has no statement to check", task.id()))
        })
}

fn unsupported(check: &str, task: &Task) -> Vec<CheckResult> {
    vec![CheckResult::core(
        CheckStatus::Success,
        format!("{check} is not supported for {}", task.instance().engine),
        "",
    )]
}

fn or_ok(results: Vec<CheckResult>) -> Vec<CheckResult> {
    if results.is_empty() {
        vec![CheckResult::core(CheckStatus::Success, "OK", "")]
    } else {
        results
    }
}

/// Checks that the statement parses.
pub struct StatementSyntaxCheckExecutor {
    advisor: Arc<dyn StatementAdvisor>,
}

impl StatementSyntaxCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(advisor: Arc<dyn StatementAdvisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl TaskCheckExecutor for StatementSyntaxCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let engine = task.instance().engine;
        if !engine.supports_syntax_check() {
            return Ok(unsupported("Syntax check", task));
        }
        let statement = statement_of(check_run, task)?;
        let advice = self.advisor.check_syntax(engine, statement).await?;
        Ok(or_ok(advice.into_iter().map(CheckResult::from).collect()))
    }
}

/// Reviews the statement against the SQL review rules.
pub struct StatementAdviseCheckExecutor {
    advisor: Arc<dyn StatementAdvisor>,
}

impl StatementAdviseCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(advisor: Arc<dyn StatementAdvisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl TaskCheckExecutor for StatementAdviseCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let engine = task.instance().engine;
        if !engine.supports_sql_review() {
            return Ok(unsupported("Statement advise", task));
        }
        let statement = statement_of(check_run, task)?;
        let advice = self.advisor.review(engine, statement).await?;
        Ok(or_ok(advice.into_iter().map(CheckResult::from).collect()))
    }
}

/// Checks that the statement kinds match the task type.
///
/// Database creation and removal are always rejected. Data-update tasks
/// are warned about schema statements and schema-update tasks about data
/// statements.
pub struct StatementTypeCheckExecutor {
    advisor: Arc<dyn StatementAdvisor>,
}

impl StatementTypeCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(advisor: Arc<dyn StatementAdvisor>) -> Self {
        Self { advisor }
    }
}

fn judge(payload: &TaskPayload, statement: &ClassifiedStatement) -> Option<CheckResult> {
    let text = &statement.text;
    let data_change = matches!(payload, TaskPayload::DataUpdate(_));
    match statement.kind {
        StatementKind::DropDatabase => Some(CheckResult::core_error(
            ErrorCode::Invalid,
            "Cannot drop database",
            format!("The statement \"{text}\" drops database"),
        )),
        StatementKind::CreateDatabase => Some(CheckResult::core_error(
            ErrorCode::Invalid,
            "Cannot create database",
            format!("The statement \"{text}\" creates database"),
        )),
        StatementKind::Ddl if data_change => Some(CheckResult::core(
            CheckStatus::Warn,
            "Data change can only run DML",
            format!("\"{text}\" is not DML"),
        )),
        StatementKind::Dml if !data_change => Some(CheckResult::core(
            CheckStatus::Warn,
            "Alter schema can only run DDL",
            format!("\"{text}\" is not DDL"),
        )),
        StatementKind::Ddl | StatementKind::Dml | StatementKind::Other => None,
    }
}

#[async_trait]
impl TaskCheckExecutor for StatementTypeCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let engine = task.instance().engine;
        if !engine.supports_statement_type_check() {
            return Ok(unsupported("Statement type check", task));
        }
        let statement = statement_of(check_run, task)?;
        let classified = self.advisor.classify(engine, statement).await?;
        Ok(or_ok(
            classified
                .iter()
                .filter_map(|part| judge(task.payload(), part))
                .collect(),
        ))
    }
}
