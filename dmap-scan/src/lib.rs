//! Library module for dmap-scan
//!
//! This module exposes the command implementations for testing purposes.
//! The binary entry point is in main.rs.

pub mod cli;
pub mod output;
pub mod report;

pub use cli::{Cli, Command};
pub use report::ScanReport;

use dmap_core::classification::load_labels;
use dmap_core::{
    RegexClassifier, Registry, Result, SampleErrors, SampleOutcome, SampleParameters, Sampler,
    classify_samples,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs the selected subcommand.
///
/// # Errors
/// Returns configuration, connection and sampling failures. A scan that
/// sampled nothing and met errors fails with the first of them.
pub async fn run(cli: &Cli) -> Result<()> {
    let registry = Registry::with_builtin_drivers()?;

    match cli.command.unwrap_or(Command::Scan) {
        Command::List => {
            list_repo_types(&registry);
            Ok(())
        }
        Command::Ping => ping(cli, registry).await,
        Command::Scan => {
            let report = scan(cli, registry).await?;
            output::save_report(&report, cli.scan.output.as_deref(), cli.scan.compress).await?;
            if let Some(path) = &cli.scan.output {
                info!("Report saved to {}", path.display());
            }
            Ok(())
        }
    }
}

/// Samples the repository and classifies the samples.
///
/// # Errors
/// See [`run`].
pub async fn scan(cli: &Cli, registry: Registry) -> Result<ScanReport> {
    let repo_type = cli.repo.repo_type()?;
    let config = cli.repo.repo_config()?;

    let classifier = match &cli.scan.labels {
        Some(path) => {
            debug!("Loading labels from {}", path.display());
            RegexClassifier::new(load_labels(path).await?)?
        }
        None => RegexClassifier::with_default_labels()?,
    };
    info!(
        repo_type,
        host = %config.host,
        database = %config.database,
        labels = classifier.label_names().count(),
        "Starting scan"
    );

    let sampler = Sampler::new(Arc::new(registry), repo_type, config, cli.scan.parameters())?;
    let cancel = cancellation_token(cli.scan.timeout());
    let outcome = sampler.sample(&cancel).await;
    cancel.cancel();
    let SampleOutcome { samples, errors } = outcome?;

    for error in errors.iter() {
        warn!("{}", report::describe(error));
    }
    if samples.is_empty() {
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        warn!("No tables matched the path filters");
        return Ok(ScanReport::new(repo_type, &[], Vec::new(), &SampleErrors::new()));
    }

    info!("Sampled {} table(s)", samples.len());
    let classifications = classify_samples(&classifier, &samples).await?;
    let report = ScanReport::new(repo_type, &samples, classifications, &errors);
    info!(
        "Found {} labeled attribute(s) with {} warning(s)",
        report.labeled_attributes(),
        report.warnings.len()
    );
    Ok(report)
}

async fn ping(cli: &Cli, registry: Registry) -> Result<()> {
    let repo_type = cli.repo.repo_type()?;
    let sampler = Sampler::new(
        Arc::new(registry),
        repo_type,
        cli.repo.repo_config()?,
        SampleParameters::default(),
    )?;

    let cancel = cancellation_token(cli.scan.timeout());
    let result = sampler.ping(&cancel).await;
    cancel.cancel();
    result?;

    println!("Connection to {repo_type} repository successful");
    Ok(())
}

fn list_repo_types(registry: &Registry) {
    println!("Supported repository types:");
    for repo_type in registry.repo_types() {
        println!("  {repo_type}");
    }
}

/// Token cancelled on Ctrl-C or once `timeout` elapses.
///
/// Cancelling the returned token stops the watcher task.
pub fn cancellation_token(timeout: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = trigger.cancelled() => return,
            () = deadline => warn!("Timeout reached, cancelling"),
            Ok(()) = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling"),
        }
        trigger.cancel();
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_token() {
        let token = cancellation_token(Some(Duration::from_secs(30)));
        assert!(!token.is_cancelled());

        tokio::time::timeout(Duration::from_secs(31), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_stays_live() {
        let token = cancellation_token(None);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
