//! Statement and connection helpers shared by the SQL drivers.

use super::RepoConfig;
use crate::error::{DmapError, Result, redact_database_url};
use crate::models::TableMetadata;
use url::Url;

/// Pool size used when `max_open_conns` is unbounded.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// SQL dialect details the shared helpers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL and its wire-compatible derivatives
    Postgres,
    /// MySQL and MariaDB
    MySql,
    /// SQLite
    Sqlite,
}

impl Dialect {
    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Quotes an identifier, doubling embedded quote characters.
    pub fn quote_ident(self, ident: &str) -> String {
        let q = self.quote_char();
        let mut quoted = String::with_capacity(ident.len().saturating_add(2));
        quoted.push(q);
        for c in ident.chars() {
            if c == q {
                quoted.push(q);
            }
            quoted.push(c);
        }
        quoted.push(q);
        quoted
    }

    /// True when the driver decodes values of `data_type` natively; every
    /// other column is cast to text in the sampling query.
    pub fn is_native_type(self, data_type: &str) -> bool {
        let data_type = data_type.to_ascii_lowercase();
        let native: &[&str] = match self {
            Dialect::Postgres => &[
                "smallint",
                "integer",
                "bigint",
                "int2",
                "int4",
                "int8",
                "real",
                "double precision",
                "float4",
                "float8",
                "boolean",
                "bool",
                "text",
                "character varying",
                "varchar",
                "character",
                "char",
                "bpchar",
                "name",
                "bytea",
            ],
            Dialect::MySql => &[
                "tinyint",
                "smallint",
                "mediumint",
                "int",
                "integer",
                "bigint",
                "float",
                "double",
                "real",
                "char",
                "varchar",
                "tinytext",
                "text",
                "mediumtext",
                "longtext",
                "binary",
                "varbinary",
                "tinyblob",
                "blob",
                "mediumblob",
                "longblob",
            ],
            // Dynamic typing: every stored value decodes natively
            Dialect::Sqlite => return true,
        };
        native.contains(&data_type.as_str())
    }

    fn text_cast(self, expr: &str) -> String {
        match self {
            Dialect::Postgres => format!("CAST({expr} AS VARCHAR)"),
            Dialect::MySql => format!("CAST({expr} AS CHAR)"),
            Dialect::Sqlite => expr.to_string(),
        }
    }

    /// Builds the sampling statement for `table`.
    ///
    /// Columns are selected in catalog order under their own names.
    /// `qualify_schema` is false for engines where the schema component is
    /// implied by the connection.
    pub fn sample_query(
        self,
        table: &TableMetadata,
        qualify_schema: bool,
        sample_size: u32,
        offset: u32,
    ) -> String {
        let columns = if table.attributes.is_empty() {
            "*".to_string()
        } else {
            table
                .attributes
                .iter()
                .map(|a| {
                    let ident = self.quote_ident(&a.name);
                    if self.is_native_type(&a.data_type) {
                        ident
                    } else {
                        format!("{} AS {}", self.text_cast(&ident), ident)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let relation = if qualify_schema {
            format!(
                "{}.{}",
                self.quote_ident(&table.schema),
                self.quote_ident(&table.name)
            )
        } else {
            self.quote_ident(&table.name)
        };

        format!("SELECT {columns} FROM {relation} LIMIT {sample_size} OFFSET {offset}")
    }
}

/// Pool size for a repository config.
pub fn pool_size(config: &RepoConfig) -> u32 {
    if config.max_open_conns == 0 {
        DEFAULT_POOL_SIZE
    } else {
        config.max_open_conns
    }
}

/// Builds a connection URL from a config.
///
/// Credentials are percent-encoded; advanced options become query
/// parameters. The returned URL contains the password and must only be
/// logged through [`redact_database_url`].
pub fn connection_url(
    scheme: &str,
    config: &RepoConfig,
    default_port: u16,
    database: &str,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{scheme}://localhost"))
        .map_err(|e| DmapError::configuration(format!("invalid URL scheme '{scheme}': {e}")))?;

    url.set_host(Some(&config.host))
        .map_err(|e| DmapError::configuration(format!("invalid host '{}': {e}", config.host)))?;

    let port = if config.port == 0 {
        default_port
    } else {
        config.port
    };
    url.set_port(Some(port))
        .map_err(|()| DmapError::configuration("cannot set port on connection URL"))?;

    let username = config.credentials.username();
    if !username.is_empty() {
        url.set_username(username)
            .map_err(|()| DmapError::configuration("cannot set username on connection URL"))?;
        url.set_password(config.credentials.password())
            .map_err(|()| DmapError::configuration("cannot set password on connection URL"))?;
    }

    url.set_path(database);

    if !config.advanced.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &config.advanced {
            pairs.append_pair(key, value);
        }
    }

    tracing::trace!("Connection URL: {}", redact_database_url(url.as_str()));
    Ok(url)
}

/// Decodes one column of a sqlx row by trying each listed Rust type in
/// order and converting the first that fits into a [`Value`].
///
/// Evaluates to `None` when no listed type is compatible with the column.
///
/// [`Value`]: crate::models::Value
macro_rules! decode_column {
    ($row:expr, $index:expr, $($ty:ty => $convert:expr),+ $(,)?) => {{
        let mut decoded: Option<$crate::models::Value> = None;
        $(
            if decoded.is_none()
                && let Ok(value) = sqlx::Row::try_get::<Option<$ty>, _>($row, $index)
            {
                decoded = Some(value.map($convert).unwrap_or($crate::models::Value::Null));
            }
        )+
        decoded
    }};
}

#[allow(unused_imports)]
pub(crate) use decode_column;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeMetadata;

    fn table() -> TableMetadata {
        let mut table = TableMetadata::new("public", "users");
        table.push_attribute(AttributeMetadata::new("public", "users", "id", "integer"));
        table.push_attribute(AttributeMetadata::new(
            "public",
            "users",
            "created",
            "timestamp with time zone",
        ));
        table
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Sqlite.quote_ident("plain"), "\"plain\"");
    }

    #[test]
    fn test_postgres_sample_query_casts_non_native() {
        let sql = Dialect::Postgres.sample_query(&table(), true, 5, 10);
        assert_eq!(
            sql,
            "SELECT \"id\", CAST(\"created\" AS VARCHAR) AS \"created\" \
             FROM \"public\".\"users\" LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_mysql_sample_query_unqualified() {
        let sql = Dialect::MySql.sample_query(&table(), false, 3, 0);
        assert_eq!(
            sql,
            "SELECT `id`, CAST(`created` AS CHAR) AS `created` FROM `users` LIMIT 3 OFFSET 0"
        );
    }

    #[test]
    fn test_sample_query_without_attributes() {
        let sql = Dialect::Sqlite.sample_query(&TableMetadata::new("main", "t"), false, 1, 0);
        assert_eq!(sql, "SELECT * FROM \"t\" LIMIT 1 OFFSET 0");
    }

    #[test]
    fn test_connection_url_encodes_and_redacts() {
        let config = RepoConfig::new("db.internal")
            .with_credentials("scan user", Some("p@ss/word".to_string()))
            .with_advanced("sslmode", "require");

        let url = connection_url("postgres", &config, 5432, "sales").unwrap();
        assert_eq!(url.port(), Some(5432));
        assert_eq!(url.path(), "/sales");
        assert_eq!(url.query(), Some("sslmode=require"));
        assert!(!url.as_str().contains("p@ss/word"));

        let redacted = redact_database_url(url.as_str());
        assert!(redacted.contains(":****@"));
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(&RepoConfig::new("h")), DEFAULT_POOL_SIZE);
        assert_eq!(pool_size(&RepoConfig::new("h").with_max_open_conns(2)), 2);
    }
}
