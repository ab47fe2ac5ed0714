//! Status patching and the cascades it triggers.

use super::{Scheduler, SchedulerError};
use crate::task::{
    domain::{
        ActivityCreate, ActivityLevel, ActivityMetadata, ActivityType, ApprovalPolicy,
        AssigneeGroup, DependencyGraph, Issue, IssueStatus, IssueStatusUpdatePayload,
        IssueWorkflow, Pipeline, PipelineStatus, PrincipalId, ProjectRole, Task, TaskCheckRun,
        TaskDependentsCanceledPayload, TaskDomainError, TaskId, TaskRunResult, TaskStatus,
        TaskStatusUpdatePayload, WorkspaceRole,
    },
    ports::{
        ActivityManager, CancellationSupport, ExternalApprovalCanceller, IssuePatch,
        PipelinePatch, TaskCheckRunCreate, TaskDagFind, TaskFind, TaskStatusPatch, TaskStore,
        TaskStoreError,
    },
};
use mockable::Clock;
use std::collections::VecDeque;
use tracing::{error, info, warn};

const CANCELLATION_REQUESTED: &str = "Task cancellation requested.";
const REASON_STAGE_DONE: &str = "All tasks in the stage are done.";
const REASON_ISSUE_NOT_OPEN: &str = "The issue is no longer open.";

impl<S, A, E, C> Scheduler<S, A, E, C>
where
    S: TaskStore + 'static,
    A: ActivityManager + 'static,
    E: ExternalApprovalCanceller + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Moves one task to `patch.status` and applies the resulting cascades.
    ///
    /// Canceling a task fires its cancel token, then cancels every task
    /// reachable from it through the dependency graph in one batch patch.
    /// The executor of each canceled task releases what it holds for it.
    /// Reaching `Done` re-reads the pipeline to complete the stage, the
    /// pipeline and the issue, and to re-assign the issue when the next
    /// stage needs a different approver.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::PatchMismatch`] when `patch` does not name
    ///   exactly `task`.
    /// - [`SchedulerError::Domain`] when the transition is not allowed from
    ///   the stored status, or cancellation is requested for a type that
    ///   cannot be canceled.
    /// - [`SchedulerError::DagCycle`] when the dependents of a canceled task
    ///   form a cycle. Nothing is patched in that case.
    /// - [`SchedulerError::Store`] when a store call fails, including
    ///   [`TaskStoreError::StatusChanged`] when the task moved between the
    ///   read and the write.
    pub async fn patch_task_status(
        &self,
        task: &Task,
        mut patch: TaskStatusPatch,
    ) -> Result<Task, SchedulerError> {
        if patch.ids.as_slice() != [task.id()] {
            return Err(SchedulerError::PatchMismatch { task_id: task.id() });
        }
        let current = self
            .store
            .get_task(task.id())
            .await?
            .ok_or(TaskStoreError::NotFound(task.id()))?;
        if let Some(expected) = patch.expected_status
            && current.status() != expected
        {
            return Err(TaskStoreError::StatusChanged {
                task_id: current.id(),
                expected,
                actual: current.status(),
            }
            .into());
        }
        current.ensure_transition(patch.status)?;
        patch.expected_status = Some(current.status());

        let mut dependents = Vec::new();
        if patch.status == TaskStatus::Canceled {
            if self.registry.cancellation(current.task_type()) != CancellationSupport::Cooperative {
                return Err(TaskDomainError::CancellationNotImplemented {
                    task_id: current.id(),
                    task_type: current.task_type(),
                }
                .into());
            }
            dependents = self.collect_dependents(current.id()).await?;
            if patch.result.is_none() {
                patch.result = Some(serde_json::to_string(&TaskRunResult::detail(
                    CANCELLATION_REQUESTED,
                ))?);
            }
        }

        let patched = self
            .store
            .patch_task_status(&patch)
            .await?
            .into_iter()
            .next()
            .ok_or(TaskStoreError::NotFound(current.id()))?;
        info!(
            task_id = %current.id(),
            from = %current.status(),
            to = %patched.status(),
            "task status changed"
        );

        let issue = self.store.get_issue_by_pipeline_id(current.pipeline_id()).await?;
        self.record_task_status_activity(&current, &patched, issue.as_ref(), patch.updater_id)
            .await;

        match patched.status() {
            TaskStatus::Canceled => {
                if let Some(token) = self.state.cancel_token(patched.id()) {
                    token.cancel();
                }
                self.registry.release(&patched).await;
                self.cancel_dependents(&patched, &dependents, issue.as_ref(), patch.updater_id)
                    .await?;
            }
            TaskStatus::Done => Box::pin(self.on_task_done(&patched, issue)).await?,
            TaskStatus::Pending => self.on_task_approved(&patched, issue).await?,
            _ => {}
        }
        Ok(patched)
    }

    /// Collects every task transitively downstream of `root`, breadth
    /// first, rejecting cyclic graphs.
    async fn collect_dependents(&self, root: TaskId) -> Result<Vec<TaskId>, SchedulerError> {
        let mut graph = DependencyGraph::new();
        let mut queue = VecDeque::from([root]);
        while let Some(from) = queue.pop_front() {
            if graph.contains(from) {
                continue;
            }
            let edges = self
                .store
                .find_task_dag_list(&TaskDagFind {
                    from_task_id: Some(from),
                    to_task_id: None,
                })
                .await?;
            let downstream: Vec<TaskId> = edges.iter().map(|edge| edge.to_task_id).collect();
            queue.extend(downstream.iter().copied());
            graph.insert(from, downstream);
        }
        Ok(graph.dependents_of(root)?)
    }

    async fn cancel_dependents(
        &self,
        task: &Task,
        dependents: &[TaskId],
        issue: Option<&Issue>,
        updater_id: PrincipalId,
    ) -> Result<(), SchedulerError> {
        if dependents.is_empty() {
            return Ok(());
        }
        let candidates = self
            .store
            .find_tasks(&TaskFind {
                ids: Some(dependents.to_vec()),
                ..TaskFind::default()
            })
            .await?;
        let unfinished: Vec<&Task> = candidates
            .iter()
            .filter(|dependent| !dependent.status().is_finished())
            .collect();
        if unfinished.is_empty() {
            return Ok(());
        }
        let ids: Vec<TaskId> = unfinished.iter().map(|dependent| dependent.id()).collect();

        for id in &ids {
            if let Some(token) = self.state.cancel_token(*id) {
                token.cancel();
            }
        }
        self.store
            .batch_patch_task_status(&ids, TaskStatus::Canceled, updater_id)
            .await?;
        for dependent in unfinished {
            self.registry.release(dependent).await;
        }
        info!(task_id = %task.id(), canceled = ids.len(), "canceled dependent tasks");

        let payload = serde_json::to_value(TaskDependentsCanceledPayload {
            task_id: task.id(),
            canceled_task_ids: ids,
        })?;
        self.emit_activity(
            ActivityCreate {
                creator_id: updater_id,
                container_id: activity_container(task, issue),
                activity_type: ActivityType::TaskDependentsCanceled,
                level: ActivityLevel::Info,
                comment: String::new(),
                payload,
            },
            issue.cloned(),
        )
        .await;
        Ok(())
    }

    async fn record_task_status_activity(
        &self,
        before: &Task,
        after: &Task,
        issue: Option<&Issue>,
        updater_id: PrincipalId,
    ) {
        let update = TaskStatusUpdatePayload {
            task_id: after.id(),
            old_status: before.status(),
            new_status: after.status(),
            issue_name: issue.map(|found| found.name.clone()).unwrap_or_default(),
            task_name: after.name().to_owned(),
        };
        let payload = match serde_json::to_value(update) {
            Ok(value) => value,
            Err(err) => {
                error!(task_id = %after.id(), error = %err, "failed to encode activity payload");
                return;
            }
        };
        let level = if after.status() == TaskStatus::Failed {
            ActivityLevel::Error
        } else {
            ActivityLevel::Info
        };
        self.emit_activity(
            ActivityCreate {
                creator_id: updater_id,
                container_id: activity_container(after, issue),
                activity_type: ActivityType::TaskStatusUpdate,
                level,
                comment: String::new(),
                payload,
            },
            issue.cloned(),
        )
        .await;
    }

    async fn emit_activity(&self, create: ActivityCreate, issue: Option<Issue>) {
        let activity_type = create.activity_type;
        if let Err(err) = self
            .activities
            .create_activity(create, ActivityMetadata { issue })
            .await
        {
            error!(activity_type = ?activity_type, error = %err, "failed to create activity");
        }
    }

    /// Clears the assignee attention flag once no task in the stage awaits
    /// approval.
    async fn on_task_approved(
        &self,
        task: &Task,
        issue: Option<Issue>,
    ) -> Result<(), SchedulerError> {
        let Some(issue) = issue else {
            return Ok(());
        };
        if issue.workflow != IssueWorkflow::Ui || !issue.assignee_need_attention {
            return Ok(());
        }
        let pipeline = self.load_pipeline(task).await?;
        let awaiting_approval = pipeline.stage(task.stage_id()).is_some_and(|stage| {
            stage
                .tasks
                .iter()
                .any(|sibling| sibling.status() == TaskStatus::PendingApproval)
        });
        if !awaiting_approval {
            self.clear_need_attention(&issue).await?;
        }
        Ok(())
    }

    async fn on_task_done(&self, task: &Task, issue: Option<Issue>) -> Result<(), SchedulerError> {
        let pipeline = self.load_pipeline(task).await?;

        if let Some(issue) = &issue
            && pipeline.stage(task.stage_id()).is_some_and(|stage| stage.is_done())
        {
            if let Err(err) = self
                .approvals
                .cancel_external_approval(issue.id, REASON_STAGE_DONE)
                .await
            {
                warn!(issue_id = %issue.id, error = %err, "failed to cancel external approval");
            }
            if issue.assignee_need_attention {
                self.clear_need_attention(issue).await?;
            }
        }

        if pipeline.is_done() {
            match issue {
                None => {
                    self.store
                        .patch_pipeline(&PipelinePatch {
                            id: pipeline.id,
                            updater_id: PrincipalId::SYSTEM_BOT,
                            status: PipelineStatus::Done,
                        })
                        .await?;
                    info!(pipeline_id = %pipeline.id, "pipeline done");
                }
                Some(issue) if issue.status == IssueStatus::Open => {
                    self.change_issue_status(
                        &issue,
                        IssueStatus::Done,
                        PrincipalId::SYSTEM_BOT,
                        "All tasks are done.",
                    )
                    .await?;
                }
                Some(_) => {}
            }
            return Ok(());
        }

        if let Some(issue) = issue {
            self.reassign_issue_if_needed(&issue, &pipeline, task).await?;
        }
        Ok(())
    }

    async fn load_pipeline(&self, task: &Task) -> Result<Pipeline, SchedulerError> {
        self.store
            .get_pipeline(task.pipeline_id())
            .await?
            .ok_or_else(|| {
                TaskStoreError::RecordNotFound {
                    kind: "pipeline",
                    id: task.pipeline_id().into_inner(),
                }
                .into()
            })
    }

    async fn clear_need_attention(&self, issue: &Issue) -> Result<(), SchedulerError> {
        let mut patch = IssuePatch::new(issue.id, PrincipalId::SYSTEM_BOT);
        patch.assignee_need_attention = Some(false);
        self.store.patch_issue(&patch).await?;
        Ok(())
    }

    /// Hands the issue to the default assignee of the active stage when the
    /// current assignee cannot approve it.
    async fn reassign_issue_if_needed(
        &self,
        issue: &Issue,
        pipeline: &Pipeline,
        task: &Task,
    ) -> Result<(), SchedulerError> {
        if issue.status != IssueStatus::Open {
            return Ok(());
        }
        let Some(active) = pipeline.active_stage() else {
            return Ok(());
        };
        if active.id == task.stage_id() {
            return Ok(());
        }

        let policy = self
            .store
            .get_pipeline_approval_policy(active.environment_id)
            .await?;
        if self.can_be_assignee(issue, issue.assignee_id, &policy).await? {
            return Ok(());
        }

        let assignee = self.default_assignee(issue, &policy).await?;
        let mut patch = IssuePatch::new(issue.id, PrincipalId::SYSTEM_BOT);
        patch.assignee_id = Some(assignee);
        self.store.patch_issue(&patch).await?;
        info!(
            issue_id = %issue.id,
            stage_id = %active.id,
            assignee_id = %assignee,
            "issue re-assigned for next stage"
        );
        Ok(())
    }

    async fn can_be_assignee(
        &self,
        issue: &Issue,
        principal_id: PrincipalId,
        policy: &ApprovalPolicy,
    ) -> Result<bool, SchedulerError> {
        if policy.is_automatic() && principal_id == PrincipalId::SYSTEM_BOT {
            return Ok(true);
        }
        match policy.assignee_group {
            AssigneeGroup::WorkspaceOwnerOrDba => {
                let principal = self.store.get_principal(principal_id).await?;
                Ok(principal.is_some_and(|principal| {
                    matches!(principal.role, WorkspaceRole::Owner | WorkspaceRole::Dba)
                }))
            }
            AssigneeGroup::ProjectOwner => {
                let owners = self
                    .store
                    .find_project_members(issue.project_id, ProjectRole::Owner)
                    .await?;
                Ok(owners.iter().any(|member| member.principal_id == principal_id))
            }
        }
    }

    async fn default_assignee(
        &self,
        issue: &Issue,
        policy: &ApprovalPolicy,
    ) -> Result<PrincipalId, SchedulerError> {
        if policy.is_automatic() {
            return Ok(PrincipalId::SYSTEM_BOT);
        }
        let candidate = match policy.assignee_group {
            AssigneeGroup::WorkspaceOwnerOrDba => {
                let mut found = None;
                for role in [WorkspaceRole::Owner, WorkspaceRole::Dba] {
                    found = self
                        .store
                        .find_principals_by_role(role)
                        .await?
                        .into_iter()
                        .map(|principal| principal.id)
                        .find(|id| *id != PrincipalId::SYSTEM_BOT);
                    if found.is_some() {
                        break;
                    }
                }
                found
            }
            AssigneeGroup::ProjectOwner => self
                .store
                .find_project_members(issue.project_id, ProjectRole::Owner)
                .await?
                .first()
                .map(|member| member.principal_id),
        };
        candidate.ok_or_else(|| {
            SchedulerError::NotFound(format!("no default assignee for issue {}", issue.id))
        })
    }

    /// Moves an issue and its pipeline to `status`.
    ///
    /// `Done` requires every task of the pipeline to be `Done`. `Canceled`
    /// cancels the running tasks and leaves the others as they are, so the
    /// issue can be reopened later. Executors still release what they hold
    /// for the unfinished ones.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Conflict`] when completing an issue with
    /// unfinished tasks, and propagates task cancellation and store errors.
    pub async fn change_issue_status(
        &self,
        issue: &Issue,
        status: IssueStatus,
        updater_id: PrincipalId,
        comment: &str,
    ) -> Result<Issue, SchedulerError> {
        let pipeline = self
            .store
            .get_pipeline(issue.pipeline_id)
            .await?
            .ok_or(TaskStoreError::RecordNotFound {
                kind: "pipeline",
                id: issue.pipeline_id.into_inner(),
            })?;

        match status {
            IssueStatus::Open => {}
            IssueStatus::Done => {
                if let Some(unfinished) = pipeline
                    .tasks()
                    .find(|task| task.status() != TaskStatus::Done)
                {
                    return Err(SchedulerError::Conflict(format!(
                        "failed to resolve issue {}: task {} has not finished",
                        issue.name,
                        unfinished.name()
                    )));
                }
            }
            IssueStatus::Canceled => self.cancel_pipeline_tasks(&pipeline, updater_id).await?,
        }

        self.store
            .patch_pipeline(&PipelinePatch {
                id: pipeline.id,
                updater_id,
                status,
            })
            .await?;

        let mut patch = IssuePatch::new(issue.id, updater_id);
        patch.status = Some(status);
        if status != IssueStatus::Open && issue.workflow == IssueWorkflow::Ui {
            patch.assignee_need_attention = Some(false);
        }
        let updated = self.store.patch_issue(&patch).await?;
        info!(issue_id = %issue.id, from = %issue.status, to = %status, "issue status changed");

        if status != IssueStatus::Open
            && let Err(err) = self
                .approvals
                .cancel_external_approval(issue.id, REASON_ISSUE_NOT_OPEN)
                .await
        {
            warn!(issue_id = %issue.id, error = %err, "failed to cancel external approval");
        }

        let payload = serde_json::to_value(IssueStatusUpdatePayload {
            old_status: issue.status,
            new_status: status,
            issue_name: updated.name.clone(),
        })?;
        self.emit_activity(
            ActivityCreate {
                creator_id: updater_id,
                container_id: issue.id.into_inner(),
                activity_type: ActivityType::IssueStatusUpdate,
                level: ActivityLevel::Info,
                comment: comment.to_owned(),
                payload,
            },
            Some(updated.clone()),
        )
        .await;
        Ok(updated)
    }

    /// Cancels the running tasks of `pipeline` and releases what the
    /// executors hold for the tasks that have not started.
    async fn cancel_pipeline_tasks(
        &self,
        pipeline: &Pipeline,
        updater_id: PrincipalId,
    ) -> Result<(), SchedulerError> {
        for task in pipeline.tasks() {
            let status = task.status();
            if status.is_finished() {
                continue;
            }
            if status != TaskStatus::Running {
                self.registry.release(task).await;
                continue;
            }
            let patch = TaskStatusPatch::single(task.id(), TaskStatus::Canceled, updater_id)
                .expecting(TaskStatus::Running);
            match self.patch_task_status(task, patch).await {
                Err(err) if err.is_status_changed() => {
                    info!(task_id = %task.id(), error = %err, "task finished before cancel");
                }
                result => {
                    result?;
                }
            }
        }
        Ok(())
    }

    /// Cancels every task left `Running` by a previous process.
    ///
    /// Their executions died with that process, so nothing is tracked in
    /// this scheduler's running set.
    ///
    /// # Errors
    ///
    /// Returns the store error when the tasks cannot be listed or patched.
    pub async fn clear_running_tasks(&self) -> Result<usize, SchedulerError> {
        let running = self
            .store
            .find_tasks(&TaskFind::by_status([TaskStatus::Running]))
            .await?;
        let ids: Vec<TaskId> = running
            .iter()
            .map(Task::id)
            .filter(|id| !self.state.is_task_running(*id))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.store
            .batch_patch_task_status(&ids, TaskStatus::Canceled, PrincipalId::SYSTEM_BOT)
            .await?;
        warn!(count = ids.len(), "canceled tasks left running by a previous process");
        Ok(ids.len())
    }

    /// Creates a check run for every check `task` requires, reusing runs
    /// that are still in flight.
    ///
    /// # Errors
    ///
    /// Returns the store error when a run cannot be created.
    pub async fn schedule_task_checks(
        &self,
        task: &Task,
        creator_id: PrincipalId,
    ) -> Result<Vec<TaskCheckRun>, SchedulerError> {
        let statement = task.payload().statement().map(str::to_owned);
        let mut runs = Vec::new();
        for check_type in task.task_type().required_checks(task.instance().engine) {
            let run = self
                .store
                .create_task_check_run_if_needed(&TaskCheckRunCreate {
                    task_id: task.id(),
                    check_type,
                    statement: statement.clone(),
                    creator_id,
                })
                .await?;
            runs.push(run);
        }
        Ok(runs)
    }
}

fn activity_container(task: &Task, issue: Option<&Issue>) -> i64 {
    issue.map_or_else(|| task.pipeline_id().into_inner(), |found| found.id.into_inner())
}
