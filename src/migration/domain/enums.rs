//! Ledger enumerations and their stored representations.

use super::MigrationError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! stored_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$variant_meta:meta])* $variant:ident => $stored:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$variant_meta])* $variant),+
        }

        impl $name {
            /// Returns the value stored in the ledger.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $stored),+
                }
            }
        }

        impl TryFrom<&str> for $name {
            type Error = MigrationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                match value {
                    $($stored => Ok(Self::$variant),)+
                    _ => Err(MigrationError::UnknownValue {
                        kind: $kind,
                        value: value.to_owned(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

stored_enum!(
    /// Where a migration originated.
    MigrationSource, "migration source" {
        /// Submitted through the UI workflow.
        Ui => "UI",
        /// Committed to a version control repository.
        Vcs => "VCS",
        /// Applied from a schema library.
        Library => "LIBRARY",
    }
);

stored_enum!(
    /// Kind of ledger row.
    MigrationType, "migration type" {
        /// Records the live schema without executing anything.
        Baseline => "BASELINE",
        /// Applies a schema change.
        Migrate => "MIGRATE",
        /// Marks a database restored or branched from another.
        Branch => "BRANCH",
        /// Applies a data change.
        Data => "DATA",
    }
);

stored_enum!(
    /// Progress of a ledger row.
    MigrationStatus, "migration status" {
        /// Recorded before execution.
        Pending => "PENDING",
        /// Executed successfully.
        Done => "DONE",
        /// Execution failed.
        Failed => "FAILED",
    }
);

impl MigrationType {
    /// Returns whether rows of this type reset the out-of-order window.
    #[must_use]
    pub const fn starts_baseline(self) -> bool {
        matches!(self, Self::Baseline | Self::Branch)
    }
}
