//! Command-line arguments.
//!
//! Connection and scan options are global so they can be given before or
//! after the subcommand. Every connection option also reads a `DMAP_*`
//! environment variable.

use clap::{ArgAction, Args, Parser, Subcommand};
use dmap_core::{DEFAULT_SAMPLE_SIZE, DmapError, RepoConfig, Result, SampleParameters};
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

/// Top-level arguments of `dmap-scan`.
#[derive(Debug, Parser)]
#[command(name = "dmap-scan")]
#[command(about = "Sample repositories and report sensitive attributes")]
#[command(version)]
#[command(long_about = "
dmap-scan - Sensitive data discovery

Connects to a repository, samples a few rows of every table selected by the
path filters, and classifies each attribute against a set of labels. Only
label names leave the process: sampled values are never written out.

When no database is given, every database on the server is sampled.

EXAMPLES:
  dmap-scan --repo-type postgres --host db.internal --user scanner --password-prompt
  dmap-scan --repo-type mysql --host 10.0.0.5 --database shop --include-paths 'shop.*.users'
  dmap-scan --repo-type sqlite --host ./app.db --output report.json
  dmap-scan list
")]
pub struct Cli {
    /// Logging options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand; `scan` when absent
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Connection options
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Sampling and report options
    #[command(flatten)]
    pub scan: ScanArgs,
}

/// Available subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sample and classify a repository (the default)
    Scan,
    /// Test the repository connection
    Ping,
    /// List supported repository types
    List,
}

/// Verbosity and log format.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Emit JSON log lines
    #[arg(long, global = true, help = "Write log lines as JSON objects")]
    pub log_json: bool,
}

/// Where and how to connect.
#[derive(Debug, Args)]
pub struct RepoArgs {
    /// Repository type
    #[arg(long, global = true, env = "DMAP_REPO_TYPE", help = "Repository type (see `dmap-scan list`)")]
    pub repo_type: Option<String>,

    /// Host name or file path
    #[arg(long, global = true, env = "DMAP_HOST", help = "Host name, or file path for SQLite")]
    pub host: Option<String>,

    /// Port
    #[arg(long, global = true, env = "DMAP_PORT", default_value_t = 0, help = "Port (0 selects the driver default)")]
    pub port: u16,

    /// User name
    #[arg(long, global = true, env = "DMAP_USER")]
    pub user: Option<String>,

    /// Password
    #[arg(
        long,
        global = true,
        env = "DMAP_PASSWORD",
        hide_env_values = true,
        conflicts_with = "password_prompt",
        help = "Password (prefer DMAP_PASSWORD or --password-prompt)"
    )]
    pub password: Option<String>,

    /// Prompt for the password
    #[arg(long, global = true, help = "Read the password from the terminal")]
    pub password_prompt: bool,

    /// Database to sample
    #[arg(long, global = true, env = "DMAP_DATABASE", help = "Database to sample; all databases when absent")]
    pub database: Option<String>,

    /// Connection budget
    #[arg(
        long,
        global = true,
        env = "DMAP_MAX_OPEN_CONNS",
        default_value_t = 0,
        help = "Bound on simultaneously open connections across all databases (0 = unbounded)"
    )]
    pub max_open_conns: u32,

    /// Driver-specific options
    #[arg(
        long,
        global = true,
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        action = ArgAction::Append,
        help = "Driver-specific option, repeatable (e.g. sslmode=require)"
    )]
    pub advanced: Vec<(String, String)>,
}

impl RepoArgs {
    /// The selected repository type.
    ///
    /// # Errors
    /// Returns a configuration error when no type was given.
    pub fn repo_type(&self) -> Result<&str> {
        self.repo_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DmapError::configuration("--repo-type is required"))
    }

    /// Builds the connection configuration, prompting for the password
    /// when requested.
    ///
    /// # Errors
    /// Returns an I/O error if the password cannot be read.
    pub fn repo_config(&self) -> Result<RepoConfig> {
        let password = if self.password_prompt {
            let password = Zeroizing::new(rpassword::prompt_password("Password: ").map_err(
                |e| DmapError::Io {
                    context: "Failed to read password".to_string(),
                    source: e,
                },
            )?);
            Some(password.to_string())
        } else {
            self.password.clone()
        };

        let mut config = RepoConfig::new(self.host.clone().unwrap_or_default())
            .with_port(self.port)
            .with_credentials(self.user.clone().unwrap_or_default(), password)
            .with_max_open_conns(self.max_open_conns);
        if let Some(database) = &self.database {
            config = config.with_database(database);
        }
        for (key, value) in &self.advanced {
            config = config.with_advanced(key, value);
        }
        Ok(config)
    }
}

/// What to sample and where the report goes.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Include patterns
    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        default_value = "*",
        help = "Comma-separated glob patterns of paths to sample (database.schema.table)"
    )]
    pub include_paths: Vec<String>,

    /// Exclude patterns
    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        help = "Comma-separated glob patterns of paths to skip"
    )]
    pub exclude_paths: Vec<String>,

    /// Rows per table
    #[arg(long, global = true, default_value_t = DEFAULT_SAMPLE_SIZE, help = "Rows to sample per table")]
    pub sample_size: u32,

    /// Rows to skip
    #[arg(long, global = true, default_value_t = 0, help = "Rows to skip before sampling")]
    pub offset: u32,

    /// Label definitions file
    #[arg(long, global = true, value_name = "FILE", help = "JSON label definitions (built-in labels when absent)")]
    pub labels: Option<PathBuf>,

    /// Deadline in seconds
    #[arg(long, global = true, value_name = "SECS", help = "Cancel the scan after this many seconds")]
    pub timeout: Option<u64>,

    /// Report file
    #[arg(short, long, global = true, value_name = "FILE", help = "Report file (stdout when absent)")]
    pub output: Option<PathBuf>,

    /// Compress the report
    #[arg(long, global = true, help = "Compress the report using Zstandard (.json.zst)")]
    pub compress: bool,
}

impl ScanArgs {
    /// Sampling parameters from the filter and size options.
    pub fn parameters(&self) -> SampleParameters {
        SampleParameters::new()
            .with_include(self.include_paths.iter().cloned())
            .with_exclude(self.exclude_paths.iter().cloned())
            .with_sample_size(self.sample_size)
            .with_offset(self.offset)
    }

    /// Scan deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
