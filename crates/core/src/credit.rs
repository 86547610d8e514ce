//! Credit pool names and the per-operation cost table.
//!
//! Provider accounts carry named credit balances (e.g. a video pool and an
//! image pool). Each operation type draws from exactly one pool at a fixed
//! base cost.

use crate::params::{
    OP_EXTEND, OP_FUSION, OP_IMAGE_TO_VIDEO, OP_TEXT_TO_VIDEO, OP_TRANSITION,
};

/// Credit pool funding video generation operations.
pub const POOL_VIDEO: &str = "video";

/// Credit pool funding image operations (asset uploads, stills).
pub const POOL_IMAGE: &str = "image";

/// Base credit cost per operation type.
const COST_TEXT_TO_VIDEO: i64 = 10;
const COST_IMAGE_TO_VIDEO: i64 = 10;
const COST_EXTEND: i64 = 6;
const COST_TRANSITION: i64 = 8;
const COST_FUSION: i64 = 12;

/// Fallback cost for operation types not in the table.
///
/// Unknown operations are rejected at the params boundary, so this only
/// matters for forward compatibility of stored rows.
const COST_DEFAULT: i64 = 10;

/// The credit pool an operation draws from.
pub fn credit_pool_for(operation_type: &str) -> &'static str {
    // Every current operation produces video; the image pool exists for
    // provider-side asset uploads metered separately by some providers.
    let _ = operation_type;
    POOL_VIDEO
}

/// The credit cost of one submission attempt for an operation.
pub fn credit_cost_for(operation_type: &str) -> i64 {
    match operation_type {
        OP_TEXT_TO_VIDEO => COST_TEXT_TO_VIDEO,
        OP_IMAGE_TO_VIDEO => COST_IMAGE_TO_VIDEO,
        OP_EXTEND => COST_EXTEND,
        OP_TRANSITION => COST_TRANSITION,
        OP_FUSION => COST_FUSION,
        _ => COST_DEFAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_operations_draw_from_video_pool() {
        for op in crate::params::VALID_OPERATION_TYPES {
            assert_eq!(credit_pool_for(op), POOL_VIDEO);
        }
    }

    #[test]
    fn cost_table_matches_constants() {
        assert_eq!(credit_cost_for(OP_TEXT_TO_VIDEO), 10);
        assert_eq!(credit_cost_for(OP_IMAGE_TO_VIDEO), 10);
        assert_eq!(credit_cost_for(OP_EXTEND), 6);
        assert_eq!(credit_cost_for(OP_TRANSITION), 8);
        assert_eq!(credit_cost_for(OP_FUSION), 12);
    }

    #[test]
    fn unknown_operation_gets_default_cost() {
        assert_eq!(credit_cost_for("hologram"), COST_DEFAULT);
    }
}
