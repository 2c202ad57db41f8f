//! Chip model extraction from board names.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::model::ModelId;

static MODEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"U([0-9]{3})").expect("model pattern is valid"));

/// Return the three digits following the first literal `U` + three digits in `board`.
///
/// The match is literal: no case folding, so `u575` is not a model.
pub fn extract_model(board: &str) -> Option<ModelId> {
    MODEL_PATTERN
        .captures(board)
        .and_then(|captures| captures.get(1))
        .map(|digits| ModelId::new(digits.as_str()))
}
