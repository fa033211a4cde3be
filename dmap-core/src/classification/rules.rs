//! Rule-based classifier built from [`Label`] definitions.
//!
//! Each label carries an optional value pattern and an optional attribute
//! name pattern. A label applies to an attribute of a row when every
//! pattern it defines matches. Labels are usually loaded from JSON:
//!
//! ```json
//! [
//!   {
//!     "name": "SSN",
//!     "description": "United States Social Security number",
//!     "tags": ["PII"],
//!     "rule": { "value": "^\\d{3}-\\d{2}-\\d{4}$" }
//!   }
//! ]
//! ```

use super::Classifier;
use crate::error::{DmapError, Result};
use crate::models::{Label, LabelSet};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const DEFAULT_LABELS: &str = include_str!("default_labels.json");

/// Returns the built-in label set.
///
/// # Errors
/// Only if the embedded definitions fail to parse.
pub fn default_labels() -> Result<Vec<Label>> {
    parse_labels(DEFAULT_LABELS, "built-in labels")
}

/// Reads label definitions from a JSON file.
pub async fn load_labels(path: &Path) -> Result<Vec<Label>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DmapError::Io {
            context: format!("Failed to read labels from {}", path.display()),
            source,
        })?;
    parse_labels(&content, &path.display().to_string())
}

fn parse_labels(content: &str, origin: &str) -> Result<Vec<Label>> {
    serde_json::from_str(content).map_err(|source| DmapError::Serialization {
        context: format!("Failed to parse {origin}"),
        source,
    })
}

#[derive(Debug)]
struct CompiledLabel {
    name: String,
    value: Option<Regex>,
    attribute: Option<Regex>,
}

impl CompiledLabel {
    fn compile(label: Label) -> Result<Self> {
        if label.rule.value.is_none() && label.rule.attribute.is_none() {
            return Err(DmapError::configuration(format!(
                "label '{}' has neither a value nor an attribute pattern",
                label.name
            )));
        }

        let compile = |pattern: Option<String>, kind: &str| -> Result<Option<Regex>> {
            pattern
                .map(|p| {
                    Regex::new(&p).map_err(|e| {
                        DmapError::classification_failed(
                            format!("invalid {kind} pattern for label '{}'", label.name),
                            e,
                        )
                    })
                })
                .transpose()
        };

        let value = compile(label.rule.value.clone(), "value")?;
        let attribute = compile(label.rule.attribute.clone(), "attribute")?;

        Ok(Self {
            name: label.name,
            value,
            attribute,
        })
    }

    fn matches(&self, attribute: &str, value: &str) -> bool {
        self.attribute.as_ref().is_none_or(|re| re.is_match(attribute))
            && self.value.as_ref().is_none_or(|re| re.is_match(value))
    }
}

/// Classifier that applies regular-expression label rules to each value.
#[derive(Debug)]
pub struct RegexClassifier {
    labels: Vec<CompiledLabel>,
}

impl RegexClassifier {
    /// Compiles `labels` into a classifier.
    ///
    /// # Errors
    /// - `Configuration` for duplicate label names or a rule without patterns
    /// - `Classification` for a pattern that does not compile
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut compiled = Vec::new();
        for label in labels {
            if !seen.insert(label.name.clone()) {
                return Err(DmapError::configuration(format!(
                    "duplicate label '{}'",
                    label.name
                )));
            }
            compiled.push(CompiledLabel::compile(label)?);
        }

        tracing::debug!("Compiled {} classification labels", compiled.len());
        Ok(Self { labels: compiled })
    }

    /// Classifier over [`default_labels`].
    pub fn with_default_labels() -> Result<Self> {
        Self::new(default_labels()?)
    }

    /// Names of the labels this classifier can assign.
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    fn labels_for(&self, attribute: &str, value: &str) -> LabelSet {
        self.labels
            .iter()
            .filter(|l| l.matches(attribute, value))
            .map(|l| l.name.clone())
            .collect()
    }
}

#[async_trait]
impl Classifier for RegexClassifier {
    async fn classify(&self, row: &BTreeMap<String, String>) -> Result<BTreeMap<String, LabelSet>> {
        Ok(row
            .iter()
            .filter_map(|(attribute, value)| {
                let labels = self.labels_for(attribute, value);
                (!labels.is_empty()).then(|| (attribute.clone(), labels))
            })
            .collect())
    }
}
