//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts

pub mod account;
pub mod artifact;
pub mod generation;
pub mod status;
pub mod submission;
