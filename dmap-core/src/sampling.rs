//! Concurrent sampling engine.
//!
//! Sampling runs as two nested fan-out stages:
//!
//! - **Database fan-out** runs when the configured database is empty. One
//!   discovery repository lists the databases, then one worker task per
//!   database opens its own repository through the [`Registry`] and runs the
//!   table fan-out against it. With `max_open_conns > 0` workers hold a
//!   shared semaphore permit for the whole lifetime of their repository, and
//!   each repository gets a share of the budget so the total number of open
//!   connections never exceeds `max_open_conns`.
//! - **Table fan-out** introspects the bound database once and samples
//!   every admitted table in its own task. At most one table per pooled
//!   connection is in flight; the others wait for a permit rather than for
//!   a pool connection, so a long queue never turns into acquire timeouts.
//!
//! Table and database failures are partial: they are collected into
//! [`SampleErrors`] next to whatever samples succeeded. Failing to list
//! databases, or cancellation before anything was collected, is fatal.
//!
//! # Cancellation
//! A [`CancellationToken`] is observed at every wait point. Stages stop
//! waiting as soon as it fires and return what they already have, with
//! [`DmapError::Cancelled`] recorded in the outcome. Database workers see
//! the same token and stop promptly; the coordinator waits for them to
//! close their repositories before it returns.

use crate::error::{DmapError, Result, SampleErrors};
use crate::filter::PathFilter;
use crate::models::{Sample, TablePath};
use crate::registry::Registry;
use crate::repository::sql::pool_size;
use crate::repository::{RepoConfig, Repository};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Rows sampled per table when the caller does not say otherwise.
pub const DEFAULT_SAMPLE_SIZE: u32 = 5;

/// What to sample from each database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleParameters {
    /// Glob patterns over `database.schema.table`; a table must match one
    pub include: Vec<String>,
    /// Glob patterns over `database.schema.table`; a match excludes the table
    pub exclude: Vec<String>,
    /// Maximum rows per table
    pub sample_size: u32,
    /// Rows to skip before sampling
    pub offset: u32,
}

impl Default for SampleParameters {
    fn default() -> Self {
        Self {
            include: vec!["*".to_string()],
            exclude: Vec::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            offset: 0,
        }
    }
}

impl SampleParameters {
    /// Creates parameters that sample every table with default sizing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to replace the include patterns.
    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to replace the exclude patterns.
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the per-table row limit.
    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Builder method to set the row offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Result of one sampling run: every successful sample plus every
/// non-fatal failure.
#[derive(Debug, Default)]
pub struct SampleOutcome {
    /// Non-empty samples, in completion order
    pub samples: Vec<Sample>,
    /// Table, database and cancellation failures
    pub errors: SampleErrors,
}

impl SampleOutcome {
    /// True when nothing failed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when the run was cut short by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.errors.is_cancelled()
    }

    /// Strict view of the outcome: any recorded failure becomes an error.
    pub fn into_result(self) -> std::result::Result<Vec<Sample>, SampleErrors> {
        if self.errors.is_empty() {
            Ok(self.samples)
        } else {
            Err(self.errors)
        }
    }

    fn absorb(&mut self, other: SampleOutcome) {
        self.samples.extend(other.samples);
        self.errors.extend(other.errors);
    }
}

/// Samples one repository, fanning out over databases and tables.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(Registry::with_builtin_drivers()?);
/// let sampler = Sampler::new(registry, "postgres", config, SampleParameters::new())?;
/// let outcome = sampler.sample(&CancellationToken::new()).await?;
/// for error in outcome.errors.iter() {
///     tracing::warn!("{error}");
/// }
/// ```
#[derive(Debug)]
pub struct Sampler {
    registry: Arc<Registry>,
    repo_type: String,
    config: RepoConfig,
    filter: Arc<PathFilter>,
    sample_size: u32,
    offset: u32,
}

impl Sampler {
    /// Creates a sampler.
    ///
    /// # Errors
    /// Returns `InvalidPattern` if an include or exclude pattern does not
    /// compile.
    pub fn new(
        registry: Arc<Registry>,
        repo_type: impl Into<String>,
        config: RepoConfig,
        params: SampleParameters,
    ) -> Result<Self> {
        let filter = PathFilter::new(&params.include, &params.exclude)?;
        Ok(Self {
            registry,
            repo_type: repo_type.into(),
            config,
            filter: Arc::new(filter),
            sample_size: params.sample_size,
            offset: params.offset,
        })
    }

    /// The repository type this sampler opens.
    pub fn repo_type(&self) -> &str {
        &self.repo_type
    }

    /// Samples the configured repository.
    ///
    /// # Errors
    /// Fatal failures only: the repository cannot be constructed, database
    /// discovery fails for a reason other than `NotSupported`, the bound
    /// database cannot be introspected, or the token fires before any work
    /// was started. Everything else is reported in the returned outcome.
    pub async fn sample(&self, cancel: &CancellationToken) -> Result<SampleOutcome> {
        info!(
            "Sampling {} repository {} (sample size {}, offset {})",
            self.repo_type, self.config, self.sample_size, self.offset
        );

        let repo = self.open_repository(self.config.clone(), cancel).await?;

        if !self.config.is_all_databases() {
            let result = self.sample_tables(&repo, cancel).await;
            close_repository(repo.as_ref(), &self.config.database).await;
            return result;
        }

        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DmapError::Cancelled),
            databases = repo.list_databases() => databases,
        };

        match discovered {
            Ok(databases) => {
                close_repository(repo.as_ref(), "<discovery>").await;
                info!("Discovered {} databases", databases.len());
                Ok(self.sample_databases(databases, cancel).await)
            }
            Err(e) if e.is_not_supported() => {
                debug!(
                    "{} has no database listing, sampling the bound database only",
                    self.repo_type
                );
                let result = self.sample_tables(&repo, cancel).await;
                close_repository(repo.as_ref(), "<default>").await;
                result
            }
            Err(e) => {
                close_repository(repo.as_ref(), "<discovery>").await;
                Err(e)
            }
        }
    }

    /// Opens a repository, pings it and closes it again.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        let repo = self.open_repository(self.config.clone(), cancel).await?;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DmapError::Cancelled),
            result = repo.ping() => result,
        };
        close_repository(repo.as_ref(), &self.config.database).await;
        result
    }

    async fn open_repository(
        &self,
        config: RepoConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Repository>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DmapError::Cancelled),
            repo = self.registry.new_repository(&self.repo_type, config) => repo,
        }
    }

    async fn sample_tables(
        &self,
        repo: &Arc<dyn Repository>,
        cancel: &CancellationToken,
    ) -> Result<SampleOutcome> {
        sample_tables(
            Arc::clone(repo),
            &self.filter,
            self.sample_size,
            self.offset,
            table_concurrency(&self.config),
            cancel,
        )
        .await
    }

    async fn sample_databases(
        &self,
        databases: Vec<String>,
        cancel: &CancellationToken,
    ) -> SampleOutcome {
        let permits = (self.config.max_open_conns > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_open_conns as usize)));
        let budget = per_database_budget(self.config.max_open_conns, databases.len());
        debug!("Each database repository may open {} connection(s)", budget);

        let mut workers = JoinSet::new();
        for database in databases {
            let worker = DatabaseWorker {
                registry: Arc::clone(&self.registry),
                repo_type: self.repo_type.clone(),
                config: self
                    .config
                    .for_database(&database)
                    .with_max_open_conns(budget),
                filter: Arc::clone(&self.filter),
                sample_size: self.sample_size,
                offset: self.offset,
                permits: permits.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut outcome = SampleOutcome::default();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                joined = workers.join_next() => Some(joined),
            };
            let Some(joined) = joined else {
                outcome.errors.push(DmapError::Cancelled);
                drain_cancelled_workers(&mut workers, &mut outcome).await;
                break;
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((database, Ok(database_outcome))) => {
                    if database_outcome.samples.is_empty() && !database_outcome.errors.is_empty() {
                        warn!(
                            "Database '{}' could not be sampled: {}",
                            database, database_outcome.errors
                        );
                    } else {
                        debug!(
                            "Database '{}' produced {} samples",
                            database,
                            database_outcome.samples.len()
                        );
                    }
                    outcome.absorb(database_outcome);
                }
                Ok((database, Err(error))) => {
                    warn!("Failed to sample database '{}': {}", database, error);
                    outcome
                        .errors
                        .push(DmapError::database_sampling(database, error));
                }
                Err(join_error) => {
                    warn!("Database worker failed: {}", join_error);
                    outcome.errors.push(DmapError::Task {
                        context: "database worker".to_string(),
                        source: join_error,
                    });
                }
            }
        }

        info!(
            "Sampled {} tables with {} failures",
            outcome.samples.len(),
            outcome.errors.len()
        );
        outcome
    }
}

/// Waits for database workers that saw the cancellation to close their
/// repositories. Late samples are kept; their cancellation errors are
/// already covered by the coordinator's own.
async fn drain_cancelled_workers(
    workers: &mut JoinSet<(String, Result<SampleOutcome>)>,
    outcome: &mut SampleOutcome,
) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((_, Ok(late))) => {
                outcome.samples.extend(late.samples);
                outcome
                    .errors
                    .extend(late.errors.into_iter().filter(|e| !e.is_cancelled()).collect());
            }
            Ok((database, Err(error))) if !error.is_cancelled() => {
                outcome
                    .errors
                    .push(DmapError::database_sampling(database, error));
            }
            Ok(_) => {}
            Err(join_error) => {
                warn!("Database worker failed during shutdown: {}", join_error);
            }
        }
    }
}

/// Connection budget of one database repository during fan-out.
///
/// At most `min(max_open_conns, databases)` workers hold a permit at once,
/// so splitting `max_open_conns` between them keeps the total within the
/// bound. 0 means unbounded and is passed through.
fn per_database_budget(max_open_conns: u32, databases: usize) -> u32 {
    if max_open_conns == 0 {
        return 0;
    }
    let workers = u32::try_from(databases)
        .unwrap_or(u32::MAX)
        .clamp(1, max_open_conns);
    max_open_conns.checked_div(workers).map_or(1, |share| share.max(1))
}

/// Tables of one repository sampled at the same time: one per pooled
/// connection.
fn table_concurrency(config: &RepoConfig) -> usize {
    usize::try_from(pool_size(config)).map_or(1, |size| size.max(1))
}

/// Everything one database worker owns.
struct DatabaseWorker {
    registry: Arc<Registry>,
    repo_type: String,
    config: RepoConfig,
    filter: Arc<PathFilter>,
    sample_size: u32,
    offset: u32,
    permits: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl DatabaseWorker {
    async fn run(self) -> (String, Result<SampleOutcome>) {
        let result = self.sample().await;
        (self.config.database.clone(), result)
    }

    async fn sample(&self) -> Result<SampleOutcome> {
        // Held until the repository below has been closed
        let _permit = match &self.permits {
            Some(permits) => Some(tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DmapError::Cancelled),
                permit = Arc::clone(permits).acquire_owned() => {
                    permit.map_err(|_| DmapError::Cancelled)?
                }
            }),
            None => None,
        };

        let repo = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DmapError::Cancelled),
            repo = self.registry.new_repository(&self.repo_type, self.config.clone()) => repo?,
        };

        let result = sample_tables(
            Arc::clone(&repo),
            &self.filter,
            self.sample_size,
            self.offset,
            table_concurrency(&self.config),
            &self.cancel,
        )
        .await;

        close_repository(repo.as_ref(), &self.config.database).await;
        result
    }
}

/// Table fan-out against one bound repository.
async fn sample_tables(
    repo: Arc<dyn Repository>,
    filter: &PathFilter,
    sample_size: u32,
    offset: u32,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<SampleOutcome> {
    let metadata = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DmapError::Cancelled),
        metadata = repo.introspect(filter) => metadata?,
    };

    debug!(
        "Sampling {} tables from database '{}'",
        metadata.table_count(),
        metadata.database
    );

    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks: JoinSet<(TablePath, Result<Sample>)> = JoinSet::new();
    for table in metadata.tables() {
        let path = metadata.table_path(table);
        let table = table.clone();
        let repo = Arc::clone(&repo);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => repo.sample_table(&table, sample_size, offset).await,
                Err(_) => Err(DmapError::Cancelled),
            };
            (path, result)
        });
    }

    let limit = usize::try_from(sample_size).unwrap_or(usize::MAX);
    let mut outcome = SampleOutcome::default();
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                outcome.errors.push(DmapError::Cancelled);
                break;
            }
            joined = tasks.join_next() => joined,
        };
        let Some(joined) = joined else {
            break;
        };

        match joined {
            Ok((path, Ok(mut sample))) => {
                sample.results.truncate(limit);
                if sample.results.is_empty() {
                    debug!("Table {} returned no rows", path);
                    continue;
                }
                outcome.samples.push(sample);
            }
            Ok((path, Err(error))) => {
                warn!("Failed to sample table {}: {}", path, error);
                outcome.errors.push(DmapError::table_sampling(path, error));
            }
            Err(join_error) => {
                warn!("Table worker failed: {}", join_error);
                outcome.errors.push(DmapError::Task {
                    context: format!("table worker in database '{}'", metadata.database),
                    source: join_error,
                });
            }
        }
    }

    Ok(outcome)
}

async fn close_repository(repo: &dyn Repository, database: &str) {
    if let Err(e) = repo.close().await {
        warn!("Failed to close repository for '{}': {}", database, e);
    }
}
