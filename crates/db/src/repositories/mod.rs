//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Every status transition is
//! an optimistic compare-and-set (`WHERE status_id = $expected`) so that
//! concurrent pollers, workers, and manual cancels cannot race a row into
//! an inconsistent state.

pub mod account_repo;
pub mod artifact_repo;
pub mod generation_repo;
pub mod submission_repo;

pub use account_repo::AccountRepo;
pub use artifact_repo::ArtifactRepo;
pub use generation_repo::GenerationRepo;
pub use submission_repo::SubmissionRepo;
