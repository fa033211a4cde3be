//! PostgreSQL-family driver.
//!
//! Serves three repository types over the PostgreSQL wire protocol:
//! - `postgres`: PostgreSQL proper, read-only sessions
//! - `redshift`: Amazon Redshift, default database `dev`
//! - `denodo`: Denodo Virtual DataPort; virtual databases are exposed as
//!   schemas of the connection, so it has no database listing
//!
//! # Security
//! - PostgreSQL sessions run with `default_transaction_read_only = on`
//! - Connection URLs are redacted in every error message

use super::sql::{Dialect, connection_url, decode_column, pool_size};
use super::{RepoConfig, Repository, repo_types};
use crate::error::{DmapError, Result, redact_database_url};
use crate::filter::PathFilter;
use crate::models::{
    AttributeMetadata, Metadata, Sample, SampleResult, TableMetadata, TablePath, Value,
};
use crate::registry::Registry;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};
use std::sync::Arc;
use std::time::Duration;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_DATABASES_QUERY: &str = "\
    SELECT datname::text AS datname \
    FROM pg_database \
    WHERE datistemplate = false AND datname NOT IN ('rdsadmin', 'padb_harvest') \
    ORDER BY datname";

const INTROSPECT_QUERY: &str = "\
    SELECT table_schema::text AS table_schema, table_name::text AS table_name, \
           column_name::text AS column_name, data_type::text AS data_type \
    FROM information_schema.columns \
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_internal') \
      AND table_schema NOT LIKE 'pg_toast%' \
      AND table_schema NOT LIKE 'pg_temp%' \
    ORDER BY table_schema, table_name, ordinal_position";

// Denodo exposes its catalog through stored procedures rather than
// information_schema.
const DENODO_INTROSPECT_QUERY: &str = "\
    SELECT database_name AS table_schema, view_name AS table_name, \
           column_name, column_sql_type AS data_type \
    FROM GET_VIEW_COLUMNS() \
    ORDER BY database_name, view_name, ordinal_position";

/// Flavor-specific defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Postgres,
    Redshift,
    Denodo,
}

impl Flavor {
    fn repo_type(self) -> &'static str {
        match self {
            Flavor::Postgres => repo_types::POSTGRES,
            Flavor::Redshift => repo_types::REDSHIFT,
            Flavor::Denodo => repo_types::DENODO,
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Flavor::Postgres => 5432,
            Flavor::Redshift => 5439,
            Flavor::Denodo => 9996,
        }
    }

    fn default_database(self) -> &'static str {
        match self {
            Flavor::Postgres => "postgres",
            Flavor::Redshift => "dev",
            Flavor::Denodo => "admin",
        }
    }
}

/// Registers `postgres`, `redshift` and `denodo`.
pub fn register(registry: &mut Registry) -> Result<()> {
    for flavor in [Flavor::Postgres, Flavor::Redshift, Flavor::Denodo] {
        registry.register(flavor.repo_type(), move |config| async move {
            let repo = PostgresRepository::connect(flavor, config).await?;
            Ok(Arc::new(repo) as Arc<dyn Repository>)
        })?;
    }
    Ok(())
}

/// Repository over a PostgreSQL-protocol connection pool.
pub struct PostgresRepository {
    flavor: Flavor,
    database: String,
    pool: PgPool,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepository")
            .field("repo_type", &self.flavor.repo_type())
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl PostgresRepository {
    /// Creates a PostgreSQL repository.
    pub async fn new(config: RepoConfig) -> Result<Self> {
        Self::connect(Flavor::Postgres, config).await
    }

    /// Creates an Amazon Redshift repository.
    pub async fn new_redshift(config: RepoConfig) -> Result<Self> {
        Self::connect(Flavor::Redshift, config).await
    }

    /// Creates a Denodo repository.
    pub async fn new_denodo(config: RepoConfig) -> Result<Self> {
        Self::connect(Flavor::Denodo, config).await
    }

    async fn connect(flavor: Flavor, config: RepoConfig) -> Result<Self> {
        config.validate()?;

        let database = if config.database.is_empty() {
            flavor.default_database().to_string()
        } else {
            config.database.clone()
        };
        let url = connection_url("postgres", &config, flavor.default_port(), &database)?;

        let mut options = PgPoolOptions::new()
            .max_connections(pool_size(&config))
            .acquire_timeout(ACQUIRE_TIMEOUT);

        if flavor == Flavor::Postgres {
            options = options.after_connect(|conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;
                    conn.execute("SET default_transaction_read_only = on").await?;
                    conn.execute("SET application_name = 'dmap'").await?;
                    Ok(())
                })
            });
        }

        let pool = options.connect_lazy(url.as_str()).map_err(|e| {
            DmapError::connection_failed(
                format!(
                    "Failed to create {} connection pool to {}",
                    flavor.repo_type(),
                    redact_database_url(url.as_str())
                ),
                e,
            )
        })?;

        tracing::debug!("Created {} pool for database '{}'", flavor.repo_type(), database);

        Ok(Self {
            flavor,
            database,
            pool,
        })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_databases(&self) -> Result<Vec<String>> {
        if self.flavor == Flavor::Denodo {
            return Err(DmapError::not_supported(
                "list_databases",
                self.flavor.repo_type(),
            ));
        }

        sqlx::query_scalar::<_, String>(LIST_DATABASES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DmapError::query_failed("Failed to list databases", e))
    }

    async fn introspect(&self, filter: &PathFilter) -> Result<Metadata> {
        let query = match self.flavor {
            Flavor::Denodo => DENODO_INTROSPECT_QUERY,
            Flavor::Postgres | Flavor::Redshift => INTROSPECT_QUERY,
        };

        let rows = sqlx::query(query).fetch_all(&self.pool).await.map_err(|e| {
            DmapError::query_failed(
                format!("Failed to introspect database '{}'", self.database),
                e,
            )
        })?;

        let mut metadata = Metadata::new(&self.database);
        for row in &rows {
            let attribute = AttributeMetadata::new(
                row.try_get::<String, _>("table_schema")
                    .map_err(|e| DmapError::query_failed("Failed to read table_schema", e))?,
                row.try_get::<String, _>("table_name")
                    .map_err(|e| DmapError::query_failed("Failed to read table_name", e))?,
                row.try_get::<String, _>("column_name")
                    .map_err(|e| DmapError::query_failed("Failed to read column_name", e))?,
                row.try_get::<Option<String>, _>("data_type")
                    .map_err(|e| DmapError::query_failed("Failed to read data_type", e))?
                    .unwrap_or_default(),
            );

            let dotted = format!("{}.{}.{}", self.database, attribute.schema, attribute.table);
            if filter.matches_dotted(&dotted) {
                metadata.add_attribute(attribute);
            }
        }

        tracing::debug!(
            "Introspected {} tables in database '{}'",
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
        let query = match self.flavor {
            Flavor::Denodo => denodo_sample_query(table, sample_size, offset),
            Flavor::Postgres | Flavor::Redshift => {
                Dialect::Postgres.sample_query(table, true, sample_size, offset)
            }
        };

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
                    format!("Failed to reach {} database '{}'", self.flavor.repo_type(), self.database),
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

/// Denodo places `OFFSET` before `LIMIT` and has no `CAST ... AS VARCHAR`
/// for every type, so values are fetched as they are.
fn denodo_sample_query(table: &TableMetadata, sample_size: u32, offset: u32) -> String {
    let dialect = Dialect::Postgres;
    let columns = if table.attributes.is_empty() {
        "*".to_string()
    } else {
        table
            .attribute_names()
            .map(|name| dialect.quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "SELECT {columns} FROM {}.{} OFFSET {offset} ROWS LIMIT {sample_size}",
        dialect.quote_ident(&table.schema),
        dialect.quote_ident(&table.name)
    )
}

fn decode_row(row: &PgRow) -> SampleResult {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let value = decode_column!(
                row,
                index,
                String => Value::Text,
                i64 => Value::Int,
                i32 => |v: i32| Value::Int(i64::from(v)),
                i16 => |v: i16| Value::Int(i64::from(v)),
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
