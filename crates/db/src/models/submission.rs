//! Provider submission entity model and DTOs.
//!
//! One row per concrete attempt to execute a generation via a specific
//! provider account. The `payload` column is the single source of truth
//! for all generation parameters of that attempt.

use genflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `provider_submissions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderSubmission {
    pub id: DbId,
    pub generation_id: DbId,
    pub provider_id: String,
    pub provider_account_id: DbId,
    /// Provider-assigned job identifier; absent when submission itself
    /// failed before the provider issued one.
    pub provider_job_id: Option<String>,
    /// Mapped provider payload for this attempt.
    pub payload: serde_json::Value,
    /// Raw provider reply to the submit call.
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Which retry attempt this submission represents (0 = first try).
    pub retry_attempt: i32,
    pub status_id: StatusId,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

/// Fields for inserting a new submission row.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubmission {
    pub generation_id: DbId,
    pub provider_id: String,
    pub provider_account_id: DbId,
    pub provider_job_id: Option<String>,
    pub payload: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_attempt: i32,
    pub status_id: StatusId,
}
