//! Pre-execution checks for tasks.
//!
//! Each executor evaluates one [`crate::task::domain::TaskCheckType`] and
//! reports a list of result items. Statement checks delegate parsing and
//! review to a [`ports::StatementAdvisor`]; the gh-ost dry run lives in
//! [`crate::osc`].

pub mod adapters;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
