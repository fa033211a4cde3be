//! In-memory repository used by the engine integration tests.
//!
//! `FakeServer` holds databases of tables with canned rows. Every
//! `FakeRepository` opened against it is counted, so tests can assert on
//! how many repositories were open at the same time and that every one of
//! them was closed.

#![allow(clippy::unwrap_used, dead_code)]

use async_trait::async_trait;
use dmap_core::{
    AttributeMetadata, DmapError, Metadata, PathFilter, Registry, RepoConfig, Repository, Result,
    Sample, SampleResult, TableMetadata, TablePath, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const FAKE: &str = "fake";

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub schema: String,
    pub name: String,
    pub attributes: Vec<String>,
    pub rows: Vec<SampleResult>,
    /// Sampling this table fails
    pub fail: bool,
    /// Return every row regardless of the requested limit
    pub ignore_limit: bool,
    pub delay: Duration,
}

impl FakeTable {
    pub fn new(schema: &str, name: &str, attributes: &[&str]) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_row(mut self, values: &[(&str, Value)]) -> Self {
        self.rows.push(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        self
    }

    /// Adds `count` rows with a single `id` column numbered from 0.
    pub fn with_numbered_rows(mut self, count: i64) -> Self {
        for id in 0..count {
            self.rows
                .push(SampleResult::from([("id".to_string(), Value::Int(id))]));
        }
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeServer {
    pub databases: BTreeMap<String, Vec<FakeTable>>,
    /// Database used when the config names none and listing is unsupported
    pub default_database: String,
    pub supports_listing: bool,
    pub fail_listing: bool,
    pub fail_introspect: Vec<String>,

    open: AtomicUsize,
    max_open: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    /// Table samples running across every repository
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// `max_open_conns` of every repository opened, in open order
    budgets: Mutex<Vec<u32>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            supports_listing: true,
            ..Default::default()
        }
    }

    pub fn with_database(mut self, name: &str, tables: Vec<FakeTable>) -> Self {
        if self.default_database.is_empty() {
            self.default_database = name.to_string();
        }
        self.databases.insert(name.to_string(), tables);
        self
    }

    pub fn without_listing(mut self) -> Self {
        self.supports_listing = false;
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_failing_introspect(mut self, database: &str) -> Self {
        self.fail_introspect.push(database.to_string());
        self
    }

    /// Repositories currently open.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Highest number of repositories ever open at once.
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// Repositories opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Repositories closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of table samples ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Connection budgets the repositories were opened with.
    pub fn budgets(&self) -> Vec<u32> {
        self.budgets.lock().unwrap().clone()
    }

    fn on_open(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts one running table sample until dropped, also when the sampling
/// task is aborted.
struct InFlight<'a>(&'a FakeServer);

impl<'a> InFlight<'a> {
    fn start(server: &'a FakeServer) -> Self {
        let now = server.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        server.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(server)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeRepository {
    server: Arc<FakeServer>,
    database: String,
    closed: AtomicBool,
}

impl FakeRepository {
    fn open(server: Arc<FakeServer>, config: &RepoConfig) -> Self {
        server.on_open();
        server.budgets.lock().unwrap().push(config.max_open_conns);
        let database = if config.database.is_empty() {
            server.default_database.clone()
        } else {
            config.database.clone()
        };
        Self {
            server,
            database,
            closed: AtomicBool::new(false),
        }
    }

    fn tables(&self) -> Result<&[FakeTable]> {
        self.server
            .databases
            .get(&self.database)
            .map(Vec::as_slice)
            .ok_or_else(|| DmapError::configuration(format!("no database '{}'", self.database)))
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn list_databases(&self) -> Result<Vec<String>> {
        if !self.server.supports_listing {
            return Err(DmapError::not_supported("list_databases", FAKE));
        }
        if self.server.fail_listing {
            return Err(DmapError::query_failed(
                "listing",
                std::io::Error::other("permission denied"),
            ));
        }
        Ok(self.server.databases.keys().cloned().collect())
    }

    async fn introspect(&self, filter: &PathFilter) -> Result<Metadata> {
        if self.server.fail_introspect.contains(&self.database) {
            return Err(DmapError::query_failed(
                "introspect",
                std::io::Error::other("catalog unavailable"),
            ));
        }

        let mut metadata = Metadata::new(&self.database);
        for table in self.tables()? {
            if !filter.matches(&TablePath::new(&self.database, &table.schema, &table.name)) {
                continue;
            }
            metadata.add_table(&table.schema, &table.name);
            for attribute in &table.attributes {
                metadata.add_attribute(AttributeMetadata::new(
                    &table.schema,
                    &table.name,
                    attribute,
                    "text",
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
        let fake = self
            .tables()?
            .iter()
            .find(|t| t.schema == table.schema && t.name == table.name)
            .ok_or_else(|| DmapError::configuration(format!("no table '{}'", table.name)))?;

        let running = InFlight::start(&self.server);
        if !fake.delay.is_zero() {
            tokio::time::sleep(fake.delay).await;
        }
        drop(running);
        if fake.fail {
            return Err(DmapError::query_failed(
                format!("sample {}", table.name),
                std::io::Error::other("relation does not exist"),
            ));
        }

        let rows: Vec<SampleResult> = if fake.ignore_limit {
            fake.rows.clone()
        } else {
            fake.rows
                .iter()
                .skip(offset as usize)
                .take(sample_size as usize)
                .cloned()
                .collect()
        };

        Ok(Sample::new(
            TablePath::new(&self.database, &table.schema, &table.name),
            rows,
        ))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.on_close();
        }
        Ok(())
    }
}

/// Registry with the fake driver bound to `server`.
pub fn fake_registry(server: &Arc<FakeServer>) -> Arc<Registry> {
    let mut registry = Registry::new();
    let server = Arc::clone(server);
    registry
        .register(FAKE, move |config| {
            let server = Arc::clone(&server);
            async move {
                Ok(Arc::new(FakeRepository::open(server, &config)) as Arc<dyn Repository>)
            }
        })
        .unwrap();
    Arc::new(registry)
}

/// The scenario database: `db.s.t1` with two rows of `age`/`ssn`, and
/// `db.s.t2` with one row of `name`.
pub fn scenario_server() -> FakeServer {
    FakeServer::new().with_database(
        "db",
        vec![
            FakeTable::new("s", "t1", &["age", "ssn"])
                .with_row(&[("age", Value::Int(34)), ("ssn", Value::from("123-45-6789"))])
                .with_row(&[("age", Value::Int(51)), ("ssn", Value::from("987-65-4321"))]),
            FakeTable::new("s", "t2", &["name"]).with_row(&[("name", Value::from("Ada"))]),
        ],
    )
}
