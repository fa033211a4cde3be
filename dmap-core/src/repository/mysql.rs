//! MySQL and MariaDB driver.
//!
//! MySQL has no separate schema level: a database *is* a schema. Paths
//! therefore repeat the database name as the schema component
//! (`shop.shop.orders`).
//!
//! Catalog columns are cast to `CHAR` because MySQL 8 reports several
//! `information_schema` columns as binary strings.

use super::sql::{Dialect, connection_url, decode_column, pool_size};
use super::{RepoConfig, Repository, repo_types};
use crate::error::{DmapError, Result, redact_database_url};
use crate::filter::PathFilter;
use crate::models::{
    AttributeMetadata, Metadata, Sample, SampleResult, TableMetadata, TablePath, Value,
};
use crate::registry::Registry;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3306;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_DATABASES_QUERY: &str = "\
    SELECT CAST(SCHEMA_NAME AS CHAR) AS schema_name \
    FROM information_schema.SCHEMATA \
    WHERE SCHEMA_NAME NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys') \
    ORDER BY SCHEMA_NAME";

const INTROSPECT_QUERY: &str = "\
    SELECT CAST(c.TABLE_SCHEMA AS CHAR) AS table_schema, \
           CAST(c.TABLE_NAME AS CHAR) AS table_name, \
           CAST(c.COLUMN_NAME AS CHAR) AS column_name, \
           CAST(c.DATA_TYPE AS CHAR) AS data_type \
    FROM information_schema.COLUMNS c \
    JOIN information_schema.TABLES t \
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
    WHERE c.TABLE_SCHEMA = ? AND t.TABLE_TYPE IN ('BASE TABLE', 'VIEW') \
    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

/// Registers `mysql`.
pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(repo_types::MYSQL, |config| async move {
        let repo = MySqlRepository::new(config).await?;
        Ok(Arc::new(repo) as Arc<dyn Repository>)
    })
}

/// Repository over a MySQL connection pool.
pub struct MySqlRepository {
    database: String,
    pool: MySqlPool,
}

impl std::fmt::Debug for MySqlRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlRepository")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl MySqlRepository {
    /// Creates a MySQL repository. An empty database leaves the connection
    /// unbound, which is enough for database discovery.
    pub async fn new(config: RepoConfig) -> Result<Self> {
        config.validate()?;

        let url = connection_url("mysql", &config, DEFAULT_PORT, &config.database)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size(&config))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(url.as_str())
            .map_err(|e| {
                DmapError::connection_failed(
                    format!(
                        "Failed to create MySQL connection pool to {}",
                        redact_database_url(url.as_str())
                    ),
                    e,
                )
            })?;

        Ok(Self {
            database: config.database.clone(),
            pool,
        })
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn list_databases(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(LIST_DATABASES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DmapError::query_failed("Failed to list MySQL databases", e))
    }

    async fn introspect(&self, filter: &PathFilter) -> Result<Metadata> {
        if self.database.is_empty() {
            return Err(DmapError::configuration(
                "MySQL introspection requires a database",
            ));
        }

        let rows = sqlx::query(INTROSPECT_QUERY)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DmapError::query_failed(
                    format!("Failed to introspect database '{}'", self.database),
                    e,
                )
            })?;

        let mut metadata = Metadata::new(&self.database);
        for row in &rows {
            let attribute = AttributeMetadata::new(
                get_text(row, "table_schema")?,
                get_text(row, "table_name")?,
                get_text(row, "column_name")?,
                get_text(row, "data_type")?,
            );
            let path = TablePath::new(&self.database, &attribute.schema, &attribute.table);
            if filter.matches(&path) {
                metadata.add_attribute(attribute);
            }
        }

        tracing::debug!(
            "Introspected {} tables in MySQL database '{}'",
            metadata.table_count(),
            self.database
        );
        Ok(metadata)
    }

    async fn sample_table(
        &self,
        table: &TableMetadata,
        sample_size: u32,
        offset: u32,
    ) -> Result<Sample> {
        let path = TablePath::new(&self.database, &table.schema, &table.name);
        let query = Dialect::MySql.sample_query(table, true, sample_size, offset);

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
            .map_err(|e| DmapError::connection_failed("Failed to reach MySQL server", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn get_text(row: &MySqlRow, column: &str) -> Result<String> {
    row.try_get::<Option<String>, _>(column)
        .map(Option::unwrap_or_default)
        .map_err(|e| DmapError::query_failed(format!("Failed to read {column}"), e))
}

fn decode_row(row: &MySqlRow) -> SampleResult {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let value = decode_column!(
                row,
                index,
                String => Value::Text,
                i64 => Value::Int,
                u64 => |v: u64| i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Int),
                f64 => Value::Float,
                f32 => |v: f32| Value::Float(f64::from(v)),
                bool => Value::Bool,
                Vec<u8> => Value::Bytes,
            )
            .unwrap_or_else(|| {
                tracing::debug!(
                    "Column '{}' has an undecodable type, sampling it as null",
                    column.name()
                );
                Value::Null
            });
            (column.name().to_string(), value)
        })
        .collect()
}
