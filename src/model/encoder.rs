//! Label encoders for the categorical survey columns.
//!
//! Classes are frozen at training time, sorted lexicographically, and coded
//! by position. An answer the training data never contained coerces to the
//! first fitted class instead of failing the assessment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fitted categorical column name -> its encoder.
pub type EncoderSet = HashMap<String, LabelEncoder>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on raw column values: normalize, dedupe, sort.
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(normalize).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Exact (normalized) class lookup.
    pub fn encode(&self, value: &str) -> Option<f64> {
        let needle = normalize(value);
        self.classes
            .iter()
            .position(|c| *c == needle)
            .map(|i| i as f64)
    }

    /// Encode with the unseen-category fallback: anything unknown becomes the
    /// first fitted class (code 0).
    pub fn encode_or_default(&self, column: &str, value: &str) -> f64 {
        match self.encode(value) {
            Some(code) => code,
            None => {
                tracing::warn!(
                    column,
                    value,
                    "unseen category, falling back to first fitted class"
                );
                0.0
            }
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_deduped() {
        let enc = LabelEncoder::fit(["RPG", "shooter", "rpg ", "moba"]);
        assert_eq!(enc.classes(), ["moba", "rpg", "shooter"]);
        assert_eq!(enc.encode("Shooter"), Some(2.0));
    }

    #[test]
    fn unseen_category_matches_first_class_exactly() {
        let enc = LabelEncoder::fit(["no", "yes"]);
        let first = enc.encode("no").unwrap();
        assert_eq!(enc.encode_or_default("guilt_after_gaming", "perhaps"), first);
        assert_eq!(enc.encode_or_default("guilt_after_gaming", ""), first);
    }

    #[test]
    fn encode_is_whitespace_and_case_insensitive() {
        let enc = LabelEncoder::fit(["often", "never"]);
        assert_eq!(enc.encode("  OFTEN "), Some(enc.encode("often").unwrap()));
        assert_eq!(enc.encode("weekly"), None);
    }
}
