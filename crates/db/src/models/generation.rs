//! Generation entity model and DTOs.
//!
//! A generation is one logical content-generation request: the validated
//! request parameters, lifecycle state, retry accounting, and the
//! resulting artifact reference. Each attempt's mapped provider payload
//! lives on its submission row, not here.

use genflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Generation {
    pub id: DbId,
    pub user_id: DbId,
    pub operation_type: String,
    pub provider_id: String,
    /// Validated request parameters, as accepted at the boundary. Retried
    /// attempts are re-mapped from this.
    pub params: serde_json::Value,
    pub status_id: StatusId,
    pub priority: i32,
    pub retry_count: i32,
    /// Per-generation retry cap, clamped to 1..=50 at creation.
    pub max_retry_attempts: i32,
    pub result_artifact_id: Option<DbId>,
    pub last_error: Option<String>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields for inserting a new pending generation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGeneration {
    pub user_id: DbId,
    pub operation_type: String,
    pub provider_id: String,
    pub params: serde_json::Value,
    pub priority: i32,
    pub max_retry_attempts: i32,
}

/// Filters for listing generations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationListQuery {
    pub user_id: Option<DbId>,
    pub status_id: Option<StatusId>,
    pub provider_id: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
