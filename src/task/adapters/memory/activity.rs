//! In-memory notification collaborators.

use async_trait::async_trait;
use mockable::Clock;
use std::sync::{Arc, RwLock};

use super::SharedClock;
use crate::task::{
    domain::{Activity, ActivityCreate, ActivityMetadata, ActivityType, IssueId},
    ports::{ActivityManager, CollaboratorError, CollaboratorResult, ExternalApprovalCanceller},
};

fn lock_error(err: impl ToString) -> CollaboratorError {
    CollaboratorError::unavailable(std::io::Error::other(err.to_string()))
}

/// Records activities in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityManager {
    activities: Arc<RwLock<Vec<Activity>>>,
    reject: bool,
    clock: SharedClock,
}

impl InMemoryActivityManager {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty recorder that stamps activities with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock: SharedClock::new(clock),
            ..Self::default()
        }
    }

    /// Creates a recorder that rejects every activity.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Returns every recorded activity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::Unavailable`] when the lock is poisoned.
    pub fn activities(&self) -> CollaboratorResult<Vec<Activity>> {
        Ok(self.activities.read().map_err(lock_error)?.clone())
    }

    /// Returns the recorded activities of one kind.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::Unavailable`] when the lock is poisoned.
    pub fn activities_of(&self, activity_type: ActivityType) -> CollaboratorResult<Vec<Activity>> {
        Ok(self
            .activities()?
            .into_iter()
            .filter(|activity| activity.create.activity_type == activity_type)
            .collect())
    }
}

#[async_trait]
impl ActivityManager for InMemoryActivityManager {
    async fn create_activity(
        &self,
        create: ActivityCreate,
        _metadata: ActivityMetadata,
    ) -> CollaboratorResult<Activity> {
        if self.reject {
            return Err(CollaboratorError::Rejected(
                "activity recording disabled".to_owned(),
            ));
        }
        let mut activities = self.activities.write().map_err(lock_error)?;
        let next_id = i64::try_from(activities.len()).unwrap_or(i64::MAX) + 1;
        let activity = Activity {
            id: next_id,
            created_at: self.clock.utc(),
            create,
        };
        activities.push(activity.clone());
        Ok(activity)
    }
}

/// Records external approval cancellations in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApprovalCanceller {
    canceled: Arc<RwLock<Vec<IssueId>>>,
}

impl InMemoryApprovalCanceller {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the issues whose external approvals were canceled.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::Unavailable`] when the lock is poisoned.
    pub fn canceled(&self) -> CollaboratorResult<Vec<IssueId>> {
        Ok(self.canceled.read().map_err(lock_error)?.clone())
    }
}

#[async_trait]
impl ExternalApprovalCanceller for InMemoryApprovalCanceller {
    async fn cancel_external_approval(
        &self,
        issue_id: IssueId,
        _reason: &str,
    ) -> CollaboratorResult<()> {
        self.canceled.write().map_err(lock_error)?.push(issue_id);
        Ok(())
    }
}
