//! Repository capability and vendor drivers.
//!
//! A [`Repository`] is one vendor's SQL data store bound to (at most) one
//! database. The sampling engine only talks to this trait; concrete drivers
//! are selected by a string key through the [`Registry`](crate::Registry).
//!
//! # Module Structure
//! - `config`: `RepoConfig` and `Credentials`
//! - `sql`: identifier quoting and statement helpers shared by SQL drivers
//! - Vendor modules (postgres, mysql, sqlite), each behind a cargo feature
//!
//! # Security
//! - All driver operations are read-only (catalog queries and `SELECT`)
//! - Passwords are never logged and are redacted from connection errors

use crate::Result;
use crate::filter::PathFilter;
use crate::models::{Metadata, Sample, TableMetadata};
use async_trait::async_trait;

pub mod config;
pub mod sql;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{Credentials, RepoConfig};

/// Repository type keys of the compiled-in drivers.
pub mod repo_types {
    /// PostgreSQL
    pub const POSTGRES: &str = "postgres";
    /// Amazon Redshift (PostgreSQL wire protocol)
    pub const REDSHIFT: &str = "redshift";
    /// Denodo virtual DataPort (PostgreSQL wire protocol, no databases)
    pub const DENODO: &str = "denodo";
    /// MySQL and MariaDB
    pub const MYSQL: &str = "mysql";
    /// SQLite database file
    pub const SQLITE: &str = "sqlite";
}

/// Capability contract every vendor driver satisfies.
///
/// # Object Safety
/// The trait is object-safe; the engine holds drivers as
/// `Arc<dyn Repository>` so table workers can share one instance.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Lists the databases this repository exposes.
    ///
    /// # Errors
    /// Returns `NotSupported` for systems without a database concept. The
    /// engine treats that as "sample the bound database only".
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Introspects the bound database, keeping only tables admitted by
    /// `filter`.
    async fn introspect(&self, filter: &PathFilter) -> Result<Metadata>;

    /// Reads at most `sample_size` rows of `table`, skipping `offset` rows.
    ///
    /// A table with fewer rows returns fewer results; that is not an error.
    async fn sample_table(
        &self,
        table: &TableMetadata,
        sample_size: u32,
        offset: u32,
    ) -> Result<Sample>;

    /// Verifies the repository is reachable.
    async fn ping(&self) -> Result<()>;

    /// Releases every resource held by this instance. Idempotent.
    async fn close(&self) -> Result<()>;
}
