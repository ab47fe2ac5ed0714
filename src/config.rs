//! Scheduler configuration.
//!
//! Configuration is a plain serde structure with defaults for every field,
//! so a JSON document only needs to name the values it overrides.

use crate::task::domain::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How many times a database swap is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoverPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl CutoverPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }

    /// Bounded retries with a fixed backoff.
    #[must_use]
    pub const fn retrying(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Per-engine cutover policies for point-in-time restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoverPolicies {
    /// `MySQL` and `TiDB` swap with a single rename attempt.
    pub mysql: CutoverPolicy,
    /// `PostgreSQL` retries while sessions still hold the database.
    pub postgres: CutoverPolicy,
}

impl Default for CutoverPolicies {
    fn default() -> Self {
        Self {
            mysql: CutoverPolicy::single_attempt(),
            postgres: CutoverPolicy::retrying(3, 3_000),
        }
    }
}

impl CutoverPolicies {
    /// Returns the policy for `engine`. Engines without a dedicated policy
    /// get a single attempt.
    #[must_use]
    pub const fn for_engine(&self, engine: Engine) -> CutoverPolicy {
        match engine {
            Engine::Postgres => self.postgres,
            Engine::Mysql | Engine::Tidb => self.mysql,
            _ => CutoverPolicy::single_attempt(),
        }
    }
}

/// Timing for the gh-ost coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostSettings {
    /// Maximum replication heartbeat lag tolerated before cutover, in
    /// milliseconds.
    pub cutover_lock_timeout_ms: u64,
    /// Interval between heartbeat lag checks while waiting to cut over.
    pub heartbeat_poll_interval_ms: u64,
    /// Interval between progress updates while syncing.
    pub progress_poll_interval_ms: u64,
}

impl Default for GhostSettings {
    fn default() -> Self {
        Self {
            cutover_lock_timeout_ms: 3_000,
            heartbeat_poll_interval_ms: 1_000,
            progress_poll_interval_ms: 1_000,
        }
    }
}

impl GhostSettings {
    /// Returns the cutover lock timeout.
    #[must_use]
    pub const fn cutover_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.cutover_lock_timeout_ms)
    }

    /// Returns the heartbeat poll interval.
    #[must_use]
    pub const fn heartbeat_poll_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_poll_interval_ms)
    }

    /// Returns the progress poll interval.
    #[must_use]
    pub const fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms)
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Maximum concurrently running tasks and checks per instance.
    pub max_connections_per_instance: usize,
    /// Release label written into migration history rows.
    pub release_version: String,
    /// gh-ost coordinator timing.
    pub ghost: GhostSettings,
    /// Point-in-time restore cutover policies.
    pub cutover_policies: CutoverPolicies,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            max_connections_per_instance: 10,
            release_version: env!("CARGO_PKG_VERSION").to_owned(),
            ghost: GhostSettings::default(),
            cutover_policies: CutoverPolicies::default(),
        }
    }
}

impl SchedulerConfig {
    /// Fast timings suitable for tests: 10 ms ticks and polls, no retry
    /// backoff.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            tick_interval_ms: 10,
            ghost: GhostSettings {
                cutover_lock_timeout_ms: 3_000,
                heartbeat_poll_interval_ms: 10,
                progress_poll_interval_ms: 10,
            },
            cutover_policies: CutoverPolicies {
                mysql: CutoverPolicy::single_attempt(),
                postgres: CutoverPolicy::retrying(3, 0),
            },
            ..Self::default()
        }
    }

    /// Sets the per-instance connection cap.
    #[must_use]
    pub fn with_max_connections_per_instance(mut self, max: usize) -> Self {
        self.max_connections_per_instance = max;
        self
    }

    /// Returns the tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Parses configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Reads and parses configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }
}

/// Errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read scheduler config: {0}")]
    Io(std::io::Error),
    /// The configuration document is invalid.
    #[error("failed to parse scheduler config: {0}")]
    Parse(serde_json::Error),
}
