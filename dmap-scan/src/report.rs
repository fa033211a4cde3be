//! Scan report written at the end of a run.

use dmap_core::{Classification, DmapError, Sample, SampleErrors, TablePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of one scan: what was sampled, which attributes carry labels,
/// and the non-fatal failures met on the way.
///
/// The report never contains sampled values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Repository type that was scanned
    pub repo_type: String,
    /// Sorted, one entry per table even when it was sampled in parts
    pub tables_sampled: Vec<TablePath>,
    /// Labeled attributes, sorted by path
    pub classifications: Vec<Classification>,
    /// Non-fatal failures, one line each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ScanReport {
    /// Builds the report of a finished scan.
    pub fn new(
        repo_type: impl Into<String>,
        samples: &[Sample],
        classifications: Vec<Classification>,
        errors: &SampleErrors,
    ) -> Self {
        let tables: BTreeSet<&TablePath> = samples.iter().map(|s| &s.path).collect();
        Self {
            repo_type: repo_type.into(),
            tables_sampled: tables.into_iter().cloned().collect(),
            classifications,
            warnings: errors.iter().map(describe).collect(),
        }
    }

    /// Number of attributes with at least one label.
    pub fn labeled_attributes(&self) -> usize {
        self.classifications.len()
    }
}

/// Renders an error with its full source chain on one line.
pub fn describe(error: &DmapError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
