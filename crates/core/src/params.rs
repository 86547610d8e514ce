//! Typed generation parameters.
//!
//! Inbound requests carry an `operation_type` string plus a free-form JSON
//! params object. [`parse_params`] turns that pair into the
//! [`OperationParams`] tagged union at the pipeline boundary, so adapters
//! only ever see validated, typed input.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Operation type constants
// ---------------------------------------------------------------------------

pub const OP_TEXT_TO_VIDEO: &str = "text_to_video";
pub const OP_IMAGE_TO_VIDEO: &str = "image_to_video";
pub const OP_EXTEND: &str = "extend";
pub const OP_TRANSITION: &str = "transition";
pub const OP_FUSION: &str = "fusion";

/// All operation types the orchestrator accepts.
pub const VALID_OPERATION_TYPES: &[&str] = &[
    OP_TEXT_TO_VIDEO,
    OP_IMAGE_TO_VIDEO,
    OP_EXTEND,
    OP_TRANSITION,
    OP_FUSION,
];

/// Longest prompt accepted before validation rejects the request.
const MAX_PROMPT_LEN: usize = 4000;

/// Upper bound on requested clip duration in seconds.
const MAX_DURATION_SECS: f64 = 120.0;

/// Upper bound on the number of source assets in a fusion request.
const MAX_FUSION_ASSETS: usize = 8;

// ---------------------------------------------------------------------------
// OperationParams
// ---------------------------------------------------------------------------

/// Validated parameters for one generation request.
///
/// The serialized form carries the discriminant in `operation_type`,
/// matching the inbound wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "snake_case")]
pub enum OperationParams {
    /// Generate a clip from a text prompt alone.
    TextToVideo {
        prompt: String,
        #[serde(default)]
        duration_secs: Option<f64>,
        #[serde(default)]
        aspect_ratio: Option<String>,
        #[serde(default)]
        seed: Option<i64>,
    },
    /// Animate a still image, optionally steered by a prompt.
    ImageToVideo {
        image_asset_id: DbId,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        duration_secs: Option<f64>,
        #[serde(default)]
        seed: Option<i64>,
    },
    /// Continue an existing clip past its last frame.
    Extend {
        video_asset_id: DbId,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        extend_secs: Option<f64>,
    },
    /// Bridge two clips with a generated transition.
    Transition {
        from_asset_id: DbId,
        to_asset_id: DbId,
        #[serde(default)]
        prompt: Option<String>,
    },
    /// Combine several source assets into one clip.
    Fusion {
        asset_ids: Vec<DbId>,
        prompt: String,
    },
}

impl OperationParams {
    /// The wire-format operation type string for this variant.
    pub fn operation_type(&self) -> &'static str {
        match self {
            OperationParams::TextToVideo { .. } => OP_TEXT_TO_VIDEO,
            OperationParams::ImageToVideo { .. } => OP_IMAGE_TO_VIDEO,
            OperationParams::Extend { .. } => OP_EXTEND,
            OperationParams::Transition { .. } => OP_TRANSITION,
            OperationParams::Fusion { .. } => OP_FUSION,
        }
    }

    /// IDs of every input artifact this operation references, in order.
    ///
    /// The pipeline's artifact stage resolves each of these to a
    /// provider-side asset id before submission.
    pub fn input_asset_ids(&self) -> Vec<DbId> {
        match self {
            OperationParams::TextToVideo { .. } => Vec::new(),
            OperationParams::ImageToVideo { image_asset_id, .. } => vec![*image_asset_id],
            OperationParams::Extend { video_asset_id, .. } => vec![*video_asset_id],
            OperationParams::Transition {
                from_asset_id,
                to_asset_id,
                ..
            } => vec![*from_asset_id, *to_asset_id],
            OperationParams::Fusion { asset_ids, .. } => asset_ids.clone(),
        }
    }

    /// Validate domain rules that the type system cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            OperationParams::TextToVideo {
                prompt,
                duration_secs,
                ..
            } => {
                validate_prompt(prompt)?;
                validate_duration(*duration_secs)
            }
            OperationParams::ImageToVideo {
                prompt,
                duration_secs,
                ..
            } => {
                if let Some(p) = prompt {
                    validate_prompt(p)?;
                }
                validate_duration(*duration_secs)
            }
            OperationParams::Extend {
                prompt, extend_secs, ..
            } => {
                if let Some(p) = prompt {
                    validate_prompt(p)?;
                }
                validate_duration(*extend_secs)
            }
            OperationParams::Transition {
                from_asset_id,
                to_asset_id,
                prompt,
            } => {
                if from_asset_id == to_asset_id {
                    return Err(CoreError::Validation(
                        "Transition source and target must be different assets".to_string(),
                    ));
                }
                if let Some(p) = prompt {
                    validate_prompt(p)?;
                }
                Ok(())
            }
            OperationParams::Fusion { asset_ids, prompt } => {
                if asset_ids.len() < 2 {
                    return Err(CoreError::Validation(
                        "Fusion requires at least two source assets".to_string(),
                    ));
                }
                if asset_ids.len() > MAX_FUSION_ASSETS {
                    return Err(CoreError::Validation(format!(
                        "Fusion accepts at most {MAX_FUSION_ASSETS} source assets"
                    )));
                }
                validate_prompt(prompt)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary parsing
// ---------------------------------------------------------------------------

/// Parse and validate an inbound `(operation_type, params)` pair.
///
/// The discriminant is injected from `operation_type` — a tag inside the
/// params object is ignored — so the request's declared operation always
/// wins, and a mismatch surfaces as a deserialization failure rather than a
/// silent reinterpretation.
pub fn parse_params(
    operation_type: &str,
    params: &serde_json::Value,
) -> Result<OperationParams, CoreError> {
    if !VALID_OPERATION_TYPES.contains(&operation_type) {
        return Err(CoreError::Validation(format!(
            "Unknown operation type '{operation_type}'. Must be one of: {}",
            VALID_OPERATION_TYPES.join(", ")
        )));
    }

    let mut tagged = match params {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        _ => {
            return Err(CoreError::Validation(
                "params must be a JSON object".to_string(),
            ))
        }
    };
    tagged.insert(
        "operation_type".to_string(),
        serde_json::Value::String(operation_type.to_string()),
    );

    let parsed: OperationParams = serde_json::from_value(serde_json::Value::Object(tagged))
        .map_err(|e| CoreError::Validation(format!("Invalid params for {operation_type}: {e}")))?;
    parsed.validate()?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty".to_string(),
        ));
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_duration(duration_secs: Option<f64>) -> Result<(), CoreError> {
    match duration_secs {
        None => Ok(()),
        Some(d) if d <= 0.0 => Err(CoreError::Validation(
            "Duration must be positive".to_string(),
        )),
        Some(d) if d > MAX_DURATION_SECS => Err(CoreError::Validation(format!(
            "Duration must not exceed {MAX_DURATION_SECS} seconds"
        ))),
        Some(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text_params(prompt: &str) -> serde_json::Value {
        serde_json::json!({ "prompt": prompt })
    }

    // -- parse_params --

    #[test]
    fn parse_text_to_video() {
        let parsed = parse_params(OP_TEXT_TO_VIDEO, &text_params("a red fox")).unwrap();
        assert_eq!(parsed.operation_type(), OP_TEXT_TO_VIDEO);
        assert!(parsed.input_asset_ids().is_empty());
    }

    #[test]
    fn parse_rejects_unknown_operation_type() {
        assert!(parse_params("teleport", &text_params("x")).is_err());
    }

    #[test]
    fn parse_rejects_non_object_params() {
        assert!(parse_params(OP_TEXT_TO_VIDEO, &serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn parse_rejects_missing_required_field() {
        // image_to_video requires image_asset_id.
        assert!(parse_params(OP_IMAGE_TO_VIDEO, &serde_json::json!({})).is_err());
    }

    #[test]
    fn declared_operation_type_wins_over_embedded_tag() {
        let params = serde_json::json!({
            "operation_type": "fusion",
            "prompt": "a red fox",
        });
        let parsed = parse_params(OP_TEXT_TO_VIDEO, &params).unwrap();
        assert_eq!(parsed.operation_type(), OP_TEXT_TO_VIDEO);
    }

    // -- input asset enumeration --

    #[test]
    fn transition_lists_both_assets_in_order() {
        let parsed = parse_params(
            OP_TRANSITION,
            &serde_json::json!({ "from_asset_id": 3, "to_asset_id": 9 }),
        )
        .unwrap();
        assert_eq!(parsed.input_asset_ids(), vec![3, 9]);
    }

    #[test]
    fn fusion_lists_all_assets() {
        let parsed = parse_params(
            OP_FUSION,
            &serde_json::json!({ "asset_ids": [1, 2, 3], "prompt": "merge" }),
        )
        .unwrap();
        assert_eq!(parsed.input_asset_ids(), vec![1, 2, 3]);
    }

    // -- validation --

    #[test]
    fn empty_prompt_rejected() {
        assert!(parse_params(OP_TEXT_TO_VIDEO, &text_params("   ")).is_err());
    }

    #[test]
    fn oversized_prompt_rejected() {
        let prompt = "x".repeat(MAX_PROMPT_LEN + 1);
        assert!(parse_params(OP_TEXT_TO_VIDEO, &text_params(&prompt)).is_err());
    }

    #[test]
    fn negative_duration_rejected() {
        let params = serde_json::json!({ "prompt": "ok", "duration_secs": -1.0 });
        assert!(parse_params(OP_TEXT_TO_VIDEO, &params).is_err());
    }

    #[test]
    fn excessive_duration_rejected() {
        let params = serde_json::json!({ "prompt": "ok", "duration_secs": 600.0 });
        assert!(parse_params(OP_TEXT_TO_VIDEO, &params).is_err());
    }

    #[test]
    fn transition_same_asset_rejected() {
        let params = serde_json::json!({ "from_asset_id": 5, "to_asset_id": 5 });
        assert!(parse_params(OP_TRANSITION, &params).is_err());
    }

    #[test]
    fn fusion_single_asset_rejected() {
        let params = serde_json::json!({ "asset_ids": [1], "prompt": "merge" });
        assert!(parse_params(OP_FUSION, &params).is_err());
    }

    #[test]
    fn fusion_too_many_assets_rejected() {
        let ids: Vec<i64> = (1..=9).collect();
        let params = serde_json::json!({ "asset_ids": ids, "prompt": "merge" });
        assert!(parse_params(OP_FUSION, &params).is_err());
    }

    // -- round trip --

    #[test]
    fn serialized_form_carries_operation_type_tag() {
        let parsed = parse_params(OP_EXTEND, &serde_json::json!({ "video_asset_id": 7 })).unwrap();
        let value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(value["operation_type"], "extend");
        assert_eq!(value["video_asset_id"], 7);
    }
}
