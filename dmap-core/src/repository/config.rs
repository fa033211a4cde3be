//! Repository connection configuration.
//!
//! `RepoConfig` is built once from external configuration and treated as
//! read-only afterwards; the sampling engine only derives per-database
//! copies from it with [`RepoConfig::for_database`].

use std::collections::BTreeMap;
use zeroize::{Zeroize, Zeroizing};

/// Credential container that zeroes its memory on drop.
///
/// The password is never exposed through `Debug` or `Display`.
#[derive(Clone, Default, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username.into()),
            password: Zeroizing::new(password),
        }
    }

    /// The user name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password, for drivers building a connection.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Connection parameters for one repository.
#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    /// Repository host (or file path for file-backed engines)
    pub host: String,
    /// Port; 0 selects the driver default
    pub port: u16,
    pub credentials: Credentials,
    /// Target database. Empty means "every database the repository exposes".
    pub database: String,
    /// Upper bound on simultaneously open connections; 0 means unbounded
    pub max_open_conns: u32,
    /// Vendor-specific options, interpreted by drivers only
    pub advanced: BTreeMap<String, String>,
}

impl std::fmt::Display for RepoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepoConfig({}", self.host)?;
        if self.port != 0 {
            write!(f, ":{}", self.port)?;
        }
        if !self.database.is_empty() {
            write!(f, "/{}", self.database)?;
        }
        write!(f, ")")
        // Credentials are intentionally omitted
    }
}

impl RepoConfig {
    /// Creates a config for `host` with defaults elsewhere.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Builder method to set the target database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Builder method to bound simultaneously open connections.
    pub fn with_max_open_conns(mut self, max_open_conns: u32) -> Self {
        self.max_open_conns = max_open_conns;
        self
    }

    /// Builder method to add a vendor-specific option.
    pub fn with_advanced(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.advanced.insert(key.into(), value.into());
        self
    }

    /// True when the config targets every database of the repository.
    pub fn is_all_databases(&self) -> bool {
        self.database.is_empty()
    }

    /// Copy of this config bound to `database`.
    pub fn for_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Looks up an advanced option.
    pub fn advanced(&self, key: &str) -> Option<&str> {
        self.advanced.get(key).map(String::as_str)
    }

    /// Validates configuration parameters.
    ///
    /// # Errors
    /// Returns a configuration error for an empty host.
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(crate::error::DmapError::configuration("host cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_database_copies_everything_else() {
        let config = RepoConfig::new("db.example.com")
            .with_port(5432)
            .with_credentials("scanner", Some("s3cret".to_string()))
            .with_max_open_conns(3)
            .with_advanced("sslmode", "require");

        assert!(config.is_all_databases());

        let copy = config.for_database("sales");
        assert_eq!(copy.database, "sales");
        assert_eq!(copy.host, "db.example.com");
        assert_eq!(copy.port, 5432);
        assert_eq!(copy.max_open_conns, 3);
        assert_eq!(copy.credentials.username(), "scanner");
        assert_eq!(copy.credentials.password(), Some("s3cret"));
        assert_eq!(copy.advanced("sslmode"), Some("require"));
        assert!(config.is_all_databases());
    }

    #[test]
    fn test_display_and_debug_hide_credentials() {
        let config = RepoConfig::new("example.com")
            .with_port(3306)
            .with_database("app")
            .with_credentials("admin", Some("hunter2".to_string()));

        let display = config.to_string();
        assert_eq!(display, "RepoConfig(example.com:3306/app)");
        assert!(!display.contains("admin"));

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_validate() {
        assert!(RepoConfig::new("localhost").validate().is_ok());
        assert!(RepoConfig::new("  ").validate().is_err());
    }

    #[test]
    fn test_credentials_without_password() {
        let creds = Credentials::new("reader", None);
        assert_eq!(creds.username(), "reader");
        assert!(!creds.has_password());
        assert_eq!(creds.password(), None);
    }
}
