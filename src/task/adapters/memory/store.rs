//! In-memory store for scheduler tests.

use async_trait::async_trait;
use mockable::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::SharedClock;
use crate::task::{
    domain::{
        ApprovalPolicy, EnvironmentId, ErrorCode, Issue, IssueId, Pipeline, PipelineId,
        PipelineStatus, Principal, PrincipalId, ProjectId, ProjectMember, ProjectRole, Task,
        TaskCheckRun, TaskCheckRunId, TaskCheckRunStatus, TaskDag, TaskId, TaskRunRecord,
        TaskStatus, WorkspaceRole,
    },
    ports::{
        IssuePatch, PipelinePatch, TaskCheckRunCreate, TaskCheckRunFind, TaskCheckRunStatusPatch,
        TaskDagFind, TaskFind, TaskStatusPatch, TaskStore, TaskStoreError, TaskStoreResult,
    },
};

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryStoreState>>,
    clock: SharedClock,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    tasks: BTreeMap<TaskId, Task>,
    run_records: HashMap<TaskId, Vec<TaskRunRecord>>,
    pipelines: BTreeMap<PipelineId, Pipeline>,
    issues: BTreeMap<IssueId, Issue>,
    dags: Vec<TaskDag>,
    check_runs: BTreeMap<TaskCheckRunId, TaskCheckRun>,
    policies: HashMap<EnvironmentId, ApprovalPolicy>,
    principals: BTreeMap<PrincipalId, Principal>,
    members: Vec<ProjectMember>,
    batch_patch_calls: usize,
}

fn lock_error(err: impl ToString) -> TaskStoreError {
    TaskStoreError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that stamps records with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            state: Arc::default(),
            clock: SharedClock::new(clock),
        }
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryStoreState>> {
        self.state.read().map_err(lock_error)
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryStoreState>> {
        self.state.write().map_err(lock_error)
    }

    /// Stores a task, replacing any task with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_task(&self, task: Task) -> TaskStoreResult<()> {
        self.write()?.tasks.insert(task.id(), task);
        Ok(())
    }

    /// Stores a pipeline. Stage task lists are ignored; tasks are attached
    /// by their stage id on read.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_pipeline(&self, mut pipeline: Pipeline) -> TaskStoreResult<()> {
        for stage in &mut pipeline.stages {
            stage.tasks.clear();
        }
        self.write()?.pipelines.insert(pipeline.id, pipeline);
        Ok(())
    }

    /// Stores an issue.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_issue(&self, issue: Issue) -> TaskStoreResult<()> {
        self.write()?.issues.insert(issue.id, issue);
        Ok(())
    }

    /// Adds a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_dag(&self, from_task_id: TaskId, to_task_id: TaskId) -> TaskStoreResult<()> {
        self.write()?.dags.push(TaskDag {
            from_task_id,
            to_task_id,
        });
        Ok(())
    }

    /// Stores a check run with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_check_run(&self, check_run: TaskCheckRun) -> TaskStoreResult<()> {
        self.write()?.check_runs.insert(check_run.id, check_run);
        Ok(())
    }

    /// Sets the approval policy of an environment.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn set_approval_policy(
        &self,
        environment_id: EnvironmentId,
        policy: ApprovalPolicy,
    ) -> TaskStoreResult<()> {
        self.write()?.policies.insert(environment_id, policy);
        Ok(())
    }

    /// Stores a principal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_principal(&self, principal: Principal) -> TaskStoreResult<()> {
        self.write()?.principals.insert(principal.id, principal);
        Ok(())
    }

    /// Adds a project membership.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn insert_project_member(&self, member: ProjectMember) -> TaskStoreResult<()> {
        self.write()?.members.push(member);
        Ok(())
    }

    /// Returns the status patches recorded for a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn run_records(&self, task_id: TaskId) -> TaskStoreResult<Vec<TaskRunRecord>> {
        Ok(self
            .read()?
            .run_records
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Returns how many batch status patches have been applied.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn batch_patch_calls(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.batch_patch_calls)
    }

    /// Returns an issue by id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn issue(&self, id: IssueId) -> TaskStoreResult<Option<Issue>> {
        Ok(self.read()?.issues.get(&id).cloned())
    }
}

fn assemble_pipeline(state: &InMemoryStoreState, record: &Pipeline) -> Pipeline {
    let mut pipeline = record.clone();
    for stage in &mut pipeline.stages {
        stage.tasks = state
            .tasks
            .values()
            .filter(|task| task.stage_id() == stage.id)
            .cloned()
            .collect();
    }
    pipeline
}

fn matches_find(task: &Task, find: &TaskFind) -> bool {
    find.ids.as_ref().is_none_or(|ids| ids.contains(&task.id()))
        && find
            .pipeline_id
            .is_none_or(|pipeline_id| task.pipeline_id() == pipeline_id)
        && find
            .status_list
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&task.status()))
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_tasks(&self, find: &TaskFind) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .values()
            .filter(|task| matches_find(task, find))
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn patch_task_status(&self, patch: &TaskStatusPatch) -> TaskStoreResult<Vec<Task>> {
        let mut state = self.write()?;
        if let Some(missing) = patch.ids.iter().find(|id| !state.tasks.contains_key(id)) {
            return Err(TaskStoreError::NotFound(*missing));
        }
        if let Some(expected) = patch.expected_status
            && let Some(moved) = patch
                .ids
                .iter()
                .filter_map(|id| state.tasks.get(id))
                .find(|task| task.status() != expected)
        {
            return Err(TaskStoreError::StatusChanged {
                task_id: moved.id(),
                expected,
                actual: moved.status(),
            });
        }

        let now = self.clock.utc();
        let mut patched = Vec::with_capacity(patch.ids.len());
        for id in &patch.ids {
            if let Some(task) = state.tasks.get_mut(id) {
                task.record_status(patch.status, patch.updater_id, now);
                patched.push(task.clone());
            }
            state.run_records.entry(*id).or_default().push(TaskRunRecord {
                status: patch.status,
                code: patch.code,
                result: patch.result.clone(),
                recorded_at: now,
            });
        }
        Ok(patched)
    }

    async fn batch_patch_task_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
        updater_id: PrincipalId,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if let Some(missing) = ids.iter().find(|id| !state.tasks.contains_key(id)) {
            return Err(TaskStoreError::NotFound(*missing));
        }
        let now = self.clock.utc();
        for id in ids {
            if let Some(task) = state.tasks.get_mut(id) {
                task.record_status(status, updater_id, now);
            }
        }
        state.batch_patch_calls += 1;
        Ok(())
    }

    async fn find_task_dag_list(&self, find: &TaskDagFind) -> TaskStoreResult<Vec<TaskDag>> {
        let state = self.read()?;
        Ok(state
            .dags
            .iter()
            .filter(|dag| find.from_task_id.is_none_or(|id| dag.from_task_id == id))
            .filter(|dag| find.to_task_id.is_none_or(|id| dag.to_task_id == id))
            .copied()
            .collect())
    }

    async fn get_pipeline(&self, id: PipelineId) -> TaskStoreResult<Option<Pipeline>> {
        let state = self.read()?;
        Ok(state
            .pipelines
            .get(&id)
            .map(|record| assemble_pipeline(&state, record)))
    }

    async fn get_issue_by_pipeline_id(
        &self,
        pipeline_id: PipelineId,
    ) -> TaskStoreResult<Option<Issue>> {
        let state = self.read()?;
        Ok(state
            .issues
            .values()
            .find(|issue| issue.pipeline_id == pipeline_id)
            .cloned())
    }

    async fn patch_issue(&self, patch: &IssuePatch) -> TaskStoreResult<Issue> {
        let mut state = self.write()?;
        let issue = state
            .issues
            .get_mut(&patch.id)
            .ok_or(TaskStoreError::RecordNotFound {
                kind: "issue",
                id: patch.id.into_inner(),
            })?;
        if let Some(status) = patch.status {
            issue.status = status;
        }
        if let Some(assignee_id) = patch.assignee_id {
            issue.assignee_id = assignee_id;
        }
        if let Some(need_attention) = patch.assignee_need_attention {
            issue.assignee_need_attention = need_attention;
        }
        Ok(issue.clone())
    }

    async fn patch_pipeline(&self, patch: &PipelinePatch) -> TaskStoreResult<Pipeline> {
        let mut state = self.write()?;
        let record = state
            .pipelines
            .get_mut(&patch.id)
            .ok_or(TaskStoreError::RecordNotFound {
                kind: "pipeline",
                id: patch.id.into_inner(),
            })?;
        record.status = patch.status;
        let snapshot = record.clone();
        Ok(assemble_pipeline(&state, &snapshot))
    }

    async fn create_task_check_run_if_needed(
        &self,
        create: &TaskCheckRunCreate,
    ) -> TaskStoreResult<TaskCheckRun> {
        let mut state = self.write()?;
        if let Some(running) = state.check_runs.values().find(|run| {
            run.task_id == create.task_id
                && run.check_type == create.check_type
                && run.status == TaskCheckRunStatus::Running
        }) {
            return Ok(running.clone());
        }

        let next_id = state
            .check_runs
            .keys()
            .next_back()
            .map_or(1, |id| id.into_inner() + 1);
        let now = self.clock.utc();
        let check_run = TaskCheckRun {
            id: TaskCheckRunId::new(next_id),
            task_id: create.task_id,
            check_type: create.check_type,
            status: TaskCheckRunStatus::Running,
            code: ErrorCode::Ok,
            result: None,
            statement: create.statement.clone(),
            created_at: now,
            updated_at: now,
        };
        state.check_runs.insert(check_run.id, check_run.clone());
        Ok(check_run)
    }

    async fn find_task_check_runs(
        &self,
        find: &TaskCheckRunFind,
    ) -> TaskStoreResult<Vec<TaskCheckRun>> {
        let state = self.read()?;
        Ok(state
            .check_runs
            .values()
            .filter(|run| find.task_id.is_none_or(|id| run.task_id == id))
            .filter(|run| {
                find.status_list
                    .as_ref()
                    .is_none_or(|statuses| statuses.contains(&run.status))
            })
            .cloned()
            .collect())
    }

    async fn patch_task_check_run_status(
        &self,
        patch: &TaskCheckRunStatusPatch,
    ) -> TaskStoreResult<TaskCheckRun> {
        let mut state = self.write()?;
        let run = state
            .check_runs
            .get_mut(&patch.id)
            .ok_or(TaskStoreError::RecordNotFound {
                kind: "task check run",
                id: patch.id.into_inner(),
            })?;
        run.status = patch.status;
        run.code = patch.code;
        run.result = Some(patch.result.clone());
        run.updated_at = self.clock.utc();
        Ok(run.clone())
    }

    async fn get_pipeline_approval_policy(
        &self,
        environment_id: EnvironmentId,
    ) -> TaskStoreResult<ApprovalPolicy> {
        Ok(self
            .read()?
            .policies
            .get(&environment_id)
            .copied()
            .unwrap_or_default())
    }

    async fn get_principal(&self, id: PrincipalId) -> TaskStoreResult<Option<Principal>> {
        Ok(self.read()?.principals.get(&id).cloned())
    }

    async fn find_principals_by_role(
        &self,
        role: WorkspaceRole,
    ) -> TaskStoreResult<Vec<Principal>> {
        Ok(self
            .read()?
            .principals
            .values()
            .filter(|principal| principal.role == role)
            .cloned()
            .collect())
    }

    async fn find_project_members(
        &self,
        project_id: ProjectId,
        role: ProjectRole,
    ) -> TaskStoreResult<Vec<ProjectMember>> {
        let mut members: Vec<ProjectMember> = self
            .read()?
            .members
            .iter()
            .filter(|member| member.project_id == project_id && member.role == role)
            .copied()
            .collect();
        members.sort_by_key(|member| member.principal_id);
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::domain::Stage;

    #[tokio::test(flavor = "multi_thread")]
    async fn get_pipeline_attaches_tasks_by_stage() -> eyre::Result<()> {
        let store = InMemoryTaskStore::new();
        store.insert_pipeline(Pipeline {
            id: PipelineId::new(1),
            name: "rollout".to_owned(),
            status: PipelineStatus::Open,
            stages: vec![Stage {
                id: crate::task::domain::StageId::new(7),
                name: "prod".to_owned(),
                environment_id: EnvironmentId::new(1),
                tasks: Vec::new(),
            }],
        })?;

        let pipeline = store
            .get_pipeline(PipelineId::new(1))
            .await?
            .ok_or_else(|| eyre::eyre!("pipeline should exist"))?;
        eyre::ensure!(pipeline.tasks().count() == 0, "no tasks were inserted");
        Ok(())
    }
}
