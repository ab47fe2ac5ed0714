//! Port contracts for statement checks.

mod advisor;

pub use advisor::{
    Advice, AdvisorError, AdvisorResult, ClassifiedStatement, StatementAdvisor, StatementKind,
};
