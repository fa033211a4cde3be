//! Sensitive data discovery tool.
//!
//! This binary connects to a repository, samples rows from every selected
//! table and reports which attributes carry sensitive-data labels.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - No credentials stored or logged
//! - Sampled values stay in memory; only label names are reported

use clap::Parser;
use dmap_core::Result;
use dmap_core::logging::{LogFormat, init_logging_with_format};
use dmap_scan::{Cli, report::describe};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.global.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging_with_format(cli.global.verbose, cli.global.quiet, format)?;

    dmap_scan::run(&cli).await.inspect_err(|e| {
        error!("{}", describe(e));
    })
}
