//! Identifier types for the task domain.
//!
//! Every identifier is a store-assigned integer wrapped in its own newtype so
//! that task, pipeline, and instance ids can never be confused.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a store-assigned identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the wrapped integer.
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a task.
    TaskId
);
define_id!(
    /// Unique identifier for a pipeline.
    PipelineId
);
define_id!(
    /// Unique identifier for a pipeline stage.
    StageId
);
define_id!(
    /// Unique identifier for an issue.
    IssueId
);
define_id!(
    /// Unique identifier for a database instance.
    InstanceId
);
define_id!(
    /// Unique identifier for a database on an instance.
    DatabaseId
);
define_id!(
    /// Unique identifier for a deployment environment.
    EnvironmentId
);
define_id!(
    /// Unique identifier for a project.
    ProjectId
);
define_id!(
    /// Unique identifier for a principal (user or bot).
    PrincipalId
);
define_id!(
    /// Unique identifier for a task check run.
    TaskCheckRunId
);

impl PrincipalId {
    /// The built-in system bot that acts on behalf of the scheduler.
    pub const SYSTEM_BOT: Self = Self(1);
}
