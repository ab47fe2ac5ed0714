//! Clock handle shared by the in-memory adapters.

use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use std::fmt;
use std::sync::Arc;

/// Cloneable clock used to stamp in-memory records.
#[derive(Clone)]
pub struct SharedClock(Arc<dyn Clock + Send + Sync>);

impl SharedClock {
    /// Wraps `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self(clock)
    }

    /// Returns the current UTC time.
    #[must_use]
    pub fn utc(&self) -> DateTime<Utc> {
        self.0.utc()
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self(Arc::new(DefaultClock))
    }
}

impl fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClock").finish_non_exhaustive()
    }
}
