//! Environment approval policies and the principals they name.

use super::{PrincipalId, ProjectId};
use serde::{Deserialize, Serialize};

/// Whether tasks in an environment need a human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalValue {
    /// Every task must be approved manually.
    ManualAlways,
    /// Tasks are approved automatically once their checks pass.
    ManualNever,
}

/// Group allowed to act as the assignee for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeGroup {
    /// Workspace owners and DBAs.
    WorkspaceOwnerOrDba,
    /// Owners of the issue's project.
    ProjectOwner,
}

/// Approval policy of one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Approval requirement.
    pub value: ApprovalValue,
    /// Group that approves tasks in the environment.
    pub assignee_group: AssigneeGroup,
}

impl ApprovalPolicy {
    /// Policy requiring manual approval by workspace owners or DBAs.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            value: ApprovalValue::ManualAlways,
            assignee_group: AssigneeGroup::WorkspaceOwnerOrDba,
        }
    }

    /// Policy approving tasks automatically.
    #[must_use]
    pub const fn automatic() -> Self {
        Self {
            value: ApprovalValue::ManualNever,
            assignee_group: AssigneeGroup::WorkspaceOwnerOrDba,
        }
    }

    /// Returns whether tasks are approved without a human.
    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        matches!(self.value, ApprovalValue::ManualNever)
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::manual()
    }
}

/// Workspace-level role of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    /// Workspace owner.
    Owner,
    /// Database administrator.
    Dba,
    /// Regular developer.
    Developer,
}

/// Project-level role of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    /// Project owner.
    Owner,
    /// Project developer.
    Developer,
}

/// Principal with its workspace role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier.
    pub id: PrincipalId,
    /// Display name.
    pub name: String,
    /// Workspace role.
    pub role: WorkspaceRole,
}

/// Membership of a principal in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    /// Project identifier.
    pub project_id: ProjectId,
    /// Member principal.
    pub principal_id: PrincipalId,
    /// Role in the project.
    pub role: ProjectRole,
}
