//! Classification of sampled values.
//!
//! A [`Classifier`] maps one row (attribute name to canonical string value)
//! to the labels each attribute carries in that row. [`classify_samples`]
//! runs a classifier over every sampled row and unions the per-row label
//! sets into one [`Classification`](crate::models::Classification) per
//! attribute.
//!
//! # Module Structure
//! - `merge`: the concurrent classify-and-union pipeline
//! - `rules`: [`RegexClassifier`] and label loading

use crate::Result;
use crate::models::LabelSet;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod merge;
pub mod rules;

pub use merge::{DEFAULT_CLASSIFY_CONCURRENCY, classify_samples, classify_samples_with_concurrency};
pub use rules::{RegexClassifier, default_labels, load_labels};

/// Labels a single row of sampled values.
///
/// Implementations must be deterministic and keep no state across calls.
/// An attribute missing from the returned map is unclassified for that row.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Maps attribute names of `row` to the labels their values carry.
    ///
    /// # Errors
    /// Any error aborts the classification run it is part of.
    async fn classify(&self, row: &BTreeMap<String, String>) -> Result<BTreeMap<String, LabelSet>>;
}
