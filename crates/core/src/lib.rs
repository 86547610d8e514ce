//! Pure domain logic for the generation dispatch orchestrator.
//!
//! This crate has no internal dependencies and no I/O. It holds the shared
//! ID/timestamp aliases, the operation-parameter model, the credit pool
//! tables, the account selection ordering, and the auto-retry classifier.
//! Everything here is synchronous and unit-testable.

pub mod credit;
pub mod error;
pub mod params;
pub mod retry;
pub mod selection;
pub mod types;
