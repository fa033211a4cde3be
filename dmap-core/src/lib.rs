//! Core library of dmap: concurrent sampling of SQL repositories and
//! classification of the sampled values.
//!
//! A run has three steps:
//! 1. A [`Registry`] resolves a repository type (`"postgres"`, `"mysql"`,
//!    ...) to a driver constructor.
//! 2. A [`Sampler`] discovers databases and tables and samples rows from
//!    each table concurrently, bounded by `max_open_conns`.
//! 3. [`classify_samples`] runs a [`Classifier`] over every sampled row and
//!    merges the labels per attribute.
//!
//! # Security Guarantees
//! - All repository operations are read-only
//! - Credentials are zeroized on drop and never logged
//! - Connection URLs are redacted before they reach error messages
//!
//! # Example
//!
//! ```rust,no_run
//! use dmap_core::{
//!     RegexClassifier, Registry, RepoConfig, SampleParameters, Sampler, classify_samples,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> dmap_core::Result<()> {
//! let registry = Arc::new(Registry::with_builtin_drivers()?);
//! let config = RepoConfig::new("localhost")
//!     .with_port(5432)
//!     .with_credentials("scanner", Some("secret".to_string()));
//!
//! let sampler = Sampler::new(registry, "postgres", config, SampleParameters::new())?;
//! let outcome = sampler.sample(&CancellationToken::new()).await?;
//!
//! let classifier = RegexClassifier::with_default_labels()?;
//! let classifications = classify_samples(&classifier, &outcome.samples).await?;
//! # Ok(())
//! # }
//! ```

pub mod classification;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod registry;
pub mod repository;
pub mod sampling;

// Re-export commonly used types
pub use classification::{Classifier, RegexClassifier, classify_samples};
pub use error::{DmapError, Result, SampleErrors};
pub use filter::PathFilter;
pub use models::{
    AttributeMetadata, AttributePath, Classification, Label, LabelRule, LabelSet, Metadata,
    Sample, SampleResult, SchemaMetadata, TableMetadata, TablePath, Value,
};
pub use registry::Registry;
pub use repository::{Credentials, RepoConfig, Repository, repo_types};
pub use sampling::{DEFAULT_SAMPLE_SIZE, SampleOutcome, SampleParameters, Sampler};
