//! Schema versions and their ordered stored form.
//!
//! Ledger rows store versions as strings that sort correctly with plain
//! string comparison. Semantic versions are zero-padded to four digits per
//! part; every other version sorts after the all-zero prefix.

use super::MigrationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking a non-semantic stored version.
pub const NON_SEMANTIC_PREFIX: &str = "0000.0000.0000-";

const PART_LIMIT: u32 = 10_000;

/// A schema version as submitted with a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationVersion {
    /// Version text, such as `20240101000000` or `1.2.3`.
    pub version: String,
    /// Whether `version` is a semantic version.
    pub use_semantic_version: bool,
    /// Suffix stored after a semantic version.
    pub semantic_version_suffix: String,
}

impl MigrationVersion {
    /// Creates a non-semantic version.
    pub fn plain(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            use_semantic_version: false,
            semantic_version_suffix: String::new(),
        }
    }

    /// Creates the default version for a change recorded at `at`, a
    /// `YYYYMMDDhhmmss` timestamp.
    #[must_use]
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        Self::plain(at.format("%Y%m%d%H%M%S").to_string())
    }

    /// Creates a semantic version with a stored suffix.
    pub fn semantic(version: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            use_semantic_version: true,
            semantic_version_suffix: suffix.into(),
        }
    }

    /// Encodes the version for storage.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidVersion`] when a semantic version is
    /// not `MAJOR.MINOR.PATCH` or a part is `10000` or larger.
    pub fn to_stored(&self) -> Result<String, MigrationError> {
        if !self.use_semantic_version {
            return Ok(format!("{NON_SEMANTIC_PREFIX}{}", self.version));
        }
        let core = self
            .version
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        let (major, minor, patch) =
            parse_parts(core).ok_or_else(|| MigrationError::InvalidVersion {
                version: self.version.clone(),
                reason: "expected MAJOR.MINOR.PATCH".to_owned(),
            })?;
        if [major, minor, patch].iter().any(|part| *part >= PART_LIMIT) {
            return Err(MigrationError::InvalidVersion {
                version: self.version.clone(),
                reason: "major, minor and patch must each be below 10000".to_owned(),
            });
        }
        Ok(format!(
            "{major:04}.{minor:04}.{patch:04}-{}",
            self.semantic_version_suffix
        ))
    }

    /// Decodes a stored version.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidStoredVersion`] when `stored` is
    /// neither prefixed as non-semantic nor a padded semantic version.
    pub fn from_stored(stored: &str) -> Result<Self, MigrationError> {
        if let Some(version) = stored.strip_prefix(NON_SEMANTIC_PREFIX) {
            return Ok(Self::plain(version));
        }
        let invalid = |reason: &str| MigrationError::InvalidStoredVersion {
            stored: stored.to_owned(),
            reason: reason.to_owned(),
        };
        let (prefix, suffix) = stored
            .split_once('-')
            .ok_or_else(|| invalid("version should contain '-'"))?;
        let (major, minor, patch) = parse_parts(prefix)
            .ok_or_else(|| invalid("version prefix should be in semantic version format"))?;
        if [major, minor, patch].iter().any(|part| *part >= PART_LIMIT) {
            return Err(invalid("major, minor and patch must each be below 10000"));
        }
        Ok(Self::semantic(format!("{major}.{minor}.{patch}"), suffix))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

fn parse_parts(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = text.split('.').map(str::parse::<u32>);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) => Some((major, minor, patch)),
        _ => None,
    }
}
