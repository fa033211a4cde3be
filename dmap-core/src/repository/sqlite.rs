//! SQLite driver.
//!
//! The database file comes from `advanced["path"]`, falling back to the
//! host field. Files are opened read-only and never created. SQLite has a
//! single attached database, reported as `main` unless the config names
//! it, so `list_databases` is not supported.

use super::sql::{Dialect, decode_column, pool_size};
use super::{RepoConfig, Repository, repo_types};
use crate::error::{DmapError, Result};
use crate::filter::PathFilter;
use crate::models::{
    AttributeMetadata, Metadata, Sample, SampleResult, TableMetadata, TablePath, Value,
};
use crate::registry::Registry;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the single SQLite database and schema.
pub const MAIN_DATABASE: &str = "main";

/// Advanced option holding the database file path.
pub const PATH_OPTION: &str = "path";

const INTROSPECT_QUERY: &str = "\
    SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type \
    FROM sqlite_master m \
    JOIN pragma_table_info(m.name) p \
    WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite_%' \
    ORDER BY m.name, p.cid";

/// Registers `sqlite`.
pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(repo_types::SQLITE, |config| async move {
        let repo = SqliteRepository::new(config).await?;
        Ok(Arc::new(repo) as Arc<dyn Repository>)
    })
}

/// Repository over one SQLite database file.
#[derive(Debug)]
pub struct SqliteRepository {
    path: PathBuf,
    database: String,
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens the database file named by the config.
    ///
    /// # Errors
    /// Returns a configuration error when no path is given, and a
    /// connection error when the file cannot be opened.
    pub async fn new(config: RepoConfig) -> Result<Self> {
        let path = config
            .advanced(PATH_OPTION)
            .unwrap_or(config.host.as_str())
            .trim()
            .to_string();
        if path.is_empty() {
            return Err(DmapError::configuration(
                "SQLite repository requires a database file path",
            ));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size(&config))
            .connect_with(options)
            .await
            .map_err(|e| {
                DmapError::connection_failed(format!("Failed to open SQLite database {path}"), e)
            })?;

        let database = if config.database.is_empty() {
            MAIN_DATABASE.to_string()
        } else {
            config.database.clone()
        };

        Ok(Self {
            path: PathBuf::from(path),
            database,
            pool,
        })
    }

    /// The database file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Err(DmapError::not_supported("list_databases", repo_types::SQLITE))
    }

    async fn introspect(&self, filter: &PathFilter) -> Result<Metadata> {
        let rows = sqlx::query(INTROSPECT_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DmapError::query_failed(
                    format!("Failed to introspect {}", self.path.display()),
                    e,
                )
            })?;

        let mut metadata = Metadata::new(&self.database);
        for row in &rows {
            let table: String = row
                .try_get("table_name")
                .map_err(|e| DmapError::query_failed("Failed to read table_name", e))?;
            let column: String = row
                .try_get("column_name")
                .map_err(|e| DmapError::query_failed("Failed to read column_name", e))?;
            let data_type: Option<String> = row
                .try_get("data_type")
                .map_err(|e| DmapError::query_failed("Failed to read data_type", e))?;

            if filter.matches(&TablePath::new(&self.database, MAIN_DATABASE, &table)) {
                metadata.add_attribute(AttributeMetadata::new(
                    MAIN_DATABASE,
                    table,
                    column,
                    data_type.unwrap_or_default(),
                ));
            }
        }

        Ok(metadata)
    }

    async fn sample_table(
        &self,
        table: &TableMetadata,
        sample_size: u32,
        offset: u32,
    ) -> Result<Sample> {
        let path = TablePath::new(&self.database, &table.schema, &table.name);
        let query = Dialect::Sqlite.sample_query(table, false, sample_size, offset);

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DmapError::query_failed(format!("Failed to sample {path}"), e))?;

        Ok(Sample::new(path, rows.iter().map(decode_row).collect()))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DmapError::connection_failed(
                    format!("Failed to query {}", self.path.display()),
                    e,
                )
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn decode_row(row: &SqliteRow) -> SampleResult {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let value = decode_column!(
                row,
                index,
                String => Value::Text,
                i64 => Value::Int,
                f64 => Value::Float,
                Vec<u8> => Value::Bytes,
            )
            .unwrap_or(Value::Null);
            (column.name().to_string(), value)
        })
        .collect()
}
