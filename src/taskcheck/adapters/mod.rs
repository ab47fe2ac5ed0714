//! Adapter implementations for the statement advisor port.

mod keyword;

pub use keyword::KeywordStatementAdvisor;
