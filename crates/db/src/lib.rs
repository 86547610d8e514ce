//! Persistence layer: entity models, repositories, and the storage seam.
//!
//! Repositories are zero-sized structs with async methods that take
//! `&PgPool` as the first argument. Status columns are SMALLINT values
//! backed by seeded lookup tables; the enums in [`models::status`] mirror
//! the seed order. The [`store::OrchestratorStore`] trait wraps the
//! repositories behind an object-safe seam so that the pipeline and poller
//! can run against an in-memory store in tests.

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use store::{OrchestratorStore, PgStore, StoreError};

/// Verify the database connection is alive.
pub async fn health_check(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
