//! In-memory adapters for the scheduler's ports.

mod activity;
mod clock;
mod store;

pub use activity::{InMemoryActivityManager, InMemoryApprovalCanceller};
pub use clock::SharedClock;
pub use store::InMemoryTaskStore;
