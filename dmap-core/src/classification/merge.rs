//! Classify-and-union over a list of samples.

use super::Classifier;
use crate::error::{DmapError, Result};
use crate::models::{AttributePath, Classification, LabelSet, Sample, canonical_row};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;

/// Rows classified concurrently by [`classify_samples`].
pub const DEFAULT_CLASSIFY_CONCURRENCY: usize = 16;

/// Classifies every row of every sample and merges the results.
///
/// Label sets for the same (table, attribute) pair are unioned, so the
/// output does not depend on row order, sample order or completion order.
/// Attributes that never received a label are omitted. The result is sorted
/// by attribute path.
///
/// # Errors
/// The first classifier failure aborts the whole merge.
pub async fn classify_samples<C>(classifier: &C, samples: &[Sample]) -> Result<Vec<Classification>>
where
    C: Classifier + ?Sized,
{
    classify_samples_with_concurrency(classifier, samples, DEFAULT_CLASSIFY_CONCURRENCY).await
}

/// [`classify_samples`] with an explicit bound on in-flight classifier calls.
pub async fn classify_samples_with_concurrency<C>(
    classifier: &C,
    samples: &[Sample],
    concurrency: usize,
) -> Result<Vec<Classification>>
where
    C: Classifier + ?Sized,
{
    let rows = samples.iter().flat_map(|sample| {
        sample
            .results
            .iter()
            .map(canonical_row)
            .filter(|row| !row.is_empty())
            .map(move |row| (&sample.path, row))
    });

    let mut classified = stream::iter(rows)
        .map(move |(path, row)| async move {
            classifier
                .classify(&row)
                .await
                .map(|labels| (path, labels))
                .map_err(|e| {
                    DmapError::classification_failed(format!("failed to classify a row of {path}"), e)
                })
        })
        .buffer_unordered(concurrency.max(1));

    let mut merged: BTreeMap<AttributePath, LabelSet> = BTreeMap::new();
    let mut row_count = 0usize;
    while let Some(result) = classified.next().await {
        let (path, labels) = result?;
        row_count = row_count.saturating_add(1);
        for (attribute, labels) in labels {
            if labels.is_empty() {
                continue;
            }
            merged
                .entry(AttributePath::new(path.clone(), attribute))
                .or_default()
                .extend(labels);
        }
    }

    tracing::debug!(
        "Classified {} rows into {} labeled attributes",
        row_count,
        merged.len()
    );

    Ok(merged
        .into_iter()
        .map(|(path, labels)| Classification { path, labels })
        .collect())
}
