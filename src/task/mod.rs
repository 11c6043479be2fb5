//! Task module - units of work produced by decomposition.
//!
//! - All types use algebraic data types with exhaustive matching
//! - Invariants are documented and enforced through private fields

mod role;
#[allow(clippy::module_inception)]
mod task;

pub use role::{UnknownRole, WorkerRole};
pub use task::{Task, TaskOutcome, TaskStatus};
