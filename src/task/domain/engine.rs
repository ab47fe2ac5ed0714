//! Database engines and the capabilities the scheduler cares about.

use super::ParseTaskEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database engine behind an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// `MySQL`.
    Mysql,
    /// `TiDB`.
    Tidb,
    /// `PostgreSQL`.
    Postgres,
    /// `ClickHouse`.
    Clickhouse,
    /// Snowflake.
    Snowflake,
    /// `SQLite`.
    Sqlite,
    /// `MongoDB`.
    Mongodb,
    /// Oracle.
    Oracle,
    /// Microsoft SQL Server.
    Mssql,
}

impl Engine {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Tidb => "tidb",
            Self::Postgres => "postgres",
            Self::Clickhouse => "clickhouse",
            Self::Snowflake => "snowflake",
            Self::Sqlite => "sqlite",
            Self::Mongodb => "mongodb",
            Self::Oracle => "oracle",
            Self::Mssql => "mssql",
        }
    }

    /// Returns whether statements for this engine can be syntax-checked.
    #[must_use]
    pub const fn supports_syntax_check(self) -> bool {
        matches!(self, Self::Mysql | Self::Tidb | Self::Postgres)
    }

    /// Returns whether statements for this engine can be reviewed by the
    /// SQL advisor.
    #[must_use]
    pub const fn supports_sql_review(self) -> bool {
        matches!(self, Self::Mysql | Self::Tidb | Self::Postgres)
    }

    /// Returns whether statement types are checked for this engine.
    #[must_use]
    pub const fn supports_statement_type_check(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Returns whether the engine can replay its change log up to a point
    /// in time.
    #[must_use]
    pub const fn supports_point_in_time_recovery(self) -> bool {
        matches!(self, Self::Mysql)
    }
}

impl TryFrom<&str> for Engine {
    type Error = ParseTaskEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "tidb" => Ok(Self::Tidb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "clickhouse" => Ok(Self::Clickhouse),
            "snowflake" => Ok(Self::Snowflake),
            "sqlite" => Ok(Self::Sqlite),
            "mongodb" => Ok(Self::Mongodb),
            "oracle" => Ok(Self::Oracle),
            "mssql" => Ok(Self::Mssql),
            _ => Err(ParseTaskEnumError::new("engine", value)),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
