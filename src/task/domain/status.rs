//! Task status state machine.

use super::ParseTaskEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for approval before it may be scheduled.
    PendingApproval,
    /// Approved and waiting for admission.
    Pending,
    /// Admitted and handed to an executor.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
    /// Stopped or withdrawn before finishing.
    Canceled,
}

impl TaskStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::PendingApproval,
        Self::Pending,
        Self::Running,
        Self::Done,
        Self::Failed,
        Self::Canceled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns the statuses reachable from `self` in one step.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::PendingApproval => &[Self::Pending, Self::Done],
            Self::Pending => &[Self::Canceled, Self::Running, Self::PendingApproval, Self::Done],
            Self::Running => &[Self::Done, Self::Failed, Self::Canceled],
            Self::Done => &[],
            Self::Failed | Self::Canceled => &[Self::PendingApproval, Self::Done],
        }
    }

    /// Returns whether the state machine permits moving to `target`.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Returns whether the status has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns whether the task has stopped executing, successfully or not.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending_approval" => Ok(Self::PendingApproval),
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ParseTaskEnumError::new("task status", value)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
