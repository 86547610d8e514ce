//! Artifact entity model.
//!
//! An artifact is a generated or uploaded media object. The
//! `provider_uploads` map caches provider-side asset ids so identical
//! bytes are never re-uploaded to the same provider.

use genflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `artifacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Artifact {
    pub id: DbId,
    /// MIME-style media type, e.g. `video/mp4`.
    pub media_type: String,
    /// Provider that produced the bytes, when generated.
    pub origin_provider_id: Option<String>,
    pub remote_url: String,
    pub local_path: Option<String>,
    /// Cache of provider-side asset ids: provider_id -> remote asset id.
    pub provider_uploads: serde_json::Value,
    pub created_at: Timestamp,
}

impl Artifact {
    /// Cached provider-side asset id for a provider, if one exists.
    pub fn provider_upload_for(&self, provider_id: &str) -> Option<String> {
        self.provider_uploads
            .get(provider_id)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Fields for inserting a new artifact row.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArtifact {
    pub media_type: String,
    pub origin_provider_id: Option<String>,
    pub remote_url: String,
    pub local_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_upload_lookup() {
        let artifact = Artifact {
            id: 1,
            media_type: "video/mp4".to_string(),
            origin_provider_id: Some("dreamframe".to_string()),
            remote_url: "https://cdn.example/clip.mp4".to_string(),
            local_path: None,
            provider_uploads: serde_json::json!({"dreamframe": "asset-abc"}),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            artifact.provider_upload_for("dreamframe").as_deref(),
            Some("asset-abc")
        );
        assert_eq!(artifact.provider_upload_for("other"), None);
    }
}
