//! Repository registry: maps a repository type key to a constructor.
//!
//! The registry is an explicit value. It is populated once at startup and
//! then shared read-only (`Arc<Registry>`) with the sampling engine, which
//! uses it to open one fresh repository per database.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = Registry::new();
//! registry.register("postgres", |cfg| async move {
//!     let repo = PostgresRepository::new(cfg).await?;
//!     Ok(Arc::new(repo) as Arc<dyn Repository>)
//! })?;
//! let repo = registry.new_repository("postgres", config).await?;
//! ```

use crate::error::{DmapError, Result};
use crate::repository::{RepoConfig, Repository};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Type-erased repository constructor.
pub type RepoConstructor =
    Arc<dyn Fn(RepoConfig) -> BoxFuture<'static, Result<Arc<dyn Repository>>> + Send + Sync>;

/// Repository type to constructor mapping.
#[derive(Default, Clone)]
pub struct Registry {
    constructors: BTreeMap<String, RepoConstructor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("repo_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every driver compiled into this build.
    ///
    /// This is the application-boundary convenience; the engine itself only
    /// ever sees the registry it is given.
    pub fn with_builtin_drivers() -> Result<Self> {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "postgresql")]
        crate::repository::postgres::register(&mut registry)?;

        #[cfg(feature = "mysql")]
        crate::repository::mysql::register(&mut registry)?;

        #[cfg(feature = "sqlite")]
        crate::repository::sqlite::register(&mut registry)?;

        Ok(registry)
    }

    /// Registers `constructor` under `repo_type`.
    ///
    /// # Errors
    /// - `InvalidRegistration` if `repo_type` is blank
    /// - `DuplicateRegistration` if `repo_type` is already registered
    ///
    /// Existing entries are never modified by a failed registration.
    pub fn register<F, Fut>(&mut self, repo_type: &str, constructor: F) -> Result<()>
    where
        F: Fn(RepoConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Repository>>> + Send + 'static,
    {
        if repo_type.trim().is_empty() {
            return Err(DmapError::InvalidRegistration {
                message: "repository type cannot be empty".to_string(),
            });
        }
        if self.constructors.contains_key(repo_type) {
            return Err(DmapError::DuplicateRegistration {
                repo_type: repo_type.to_string(),
            });
        }

        let constructor: RepoConstructor = Arc::new(move |cfg| Box::pin(constructor(cfg)));
        self.constructors.insert(repo_type.to_string(), constructor);
        tracing::debug!("Registered repository type '{}'", repo_type);
        Ok(())
    }

    /// Removes `repo_type`. No-op if it is not registered.
    pub fn unregister(&mut self, repo_type: &str) {
        if self.constructors.remove(repo_type).is_some() {
            tracing::debug!("Unregistered repository type '{}'", repo_type);
        }
    }

    /// True if a constructor exists for `repo_type`.
    pub fn is_registered(&self, repo_type: &str) -> bool {
        self.constructors.contains_key(repo_type)
    }

    /// Registered repository types, sorted.
    pub fn repo_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Constructs a new repository of type `repo_type`.
    ///
    /// # Errors
    /// - `UnsupportedRepoType` if `repo_type` was never registered
    /// - `RepositoryConstruction` wrapping the constructor's own error
    pub async fn new_repository(
        &self,
        repo_type: &str,
        config: RepoConfig,
    ) -> Result<Arc<dyn Repository>> {
        let constructor =
            self.constructors
                .get(repo_type)
                .ok_or_else(|| DmapError::UnsupportedRepoType {
                    repo_type: repo_type.to_string(),
                })?;

        tracing::debug!("Creating {} repository for {}", repo_type, config);

        constructor(config)
            .await
            .map_err(|e| DmapError::RepositoryConstruction {
                repo_type: repo_type.to_string(),
                source: Box::new(e),
            })
    }
}
