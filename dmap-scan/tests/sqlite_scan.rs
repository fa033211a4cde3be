//! End-to-end scans of a SQLite file through the command-line entry points.

#![cfg(feature = "sqlite")]
#![allow(clippy::unwrap_used)]

use clap::Parser;
use dmap_core::{DmapError, Registry, TablePath};
use dmap_scan::{Cli, ScanReport, scan};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

async fn create_database(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("crm.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true),
        )
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE contacts (id INTEGER PRIMARY KEY, email TEXT, ssn TEXT, notes TEXT)",
        "INSERT INTO contacts VALUES
            (1, 'ada@example.com', '123-45-6789', 'call back'),
            (2, 'grace@example.com', NULL, NULL)",
        "CREATE TABLE settings (name TEXT, value TEXT)",
        "INSERT INTO settings VALUES ('theme', 'dark')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
    path
}

fn cli(path: &Path, extra: &[&str]) -> Cli {
    let host = path.display().to_string();
    let mut args = vec!["dmap-scan", "--repo-type", "sqlite", "--host", host.as_str()];
    args.extend_from_slice(extra);
    Cli::try_parse_from(args).unwrap()
}

fn labels_of(report: &ScanReport, attribute: &str) -> Vec<String> {
    report
        .classifications
        .iter()
        .find(|c| c.path.attribute == attribute)
        .map(|c| c.labels.iter().cloned().collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_sqlite_scan_reports_labeled_attributes() {
    let dir = TempDir::new().unwrap();
    let path = create_database(&dir).await;

    let report = scan(&cli(&path, &[]), Registry::with_builtin_drivers().unwrap())
        .await
        .unwrap();

    assert_eq!(report.repo_type, "sqlite");
    assert_eq!(
        report.tables_sampled,
        vec![
            TablePath::new("main", "main", "contacts"),
            TablePath::new("main", "main", "settings"),
        ]
    );
    assert_eq!(labels_of(&report, "email"), vec!["EMAIL"]);
    assert_eq!(labels_of(&report, "ssn"), vec!["SSN"]);
    assert!(labels_of(&report, "notes").is_empty());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_sqlite_scan_with_custom_labels_and_filters() {
    let dir = TempDir::new().unwrap();
    let path = create_database(&dir).await;
    let labels = dir.path().join("labels.json");
    std::fs::write(
        &labels,
        r#"[{"name": "PREFERENCE", "description": "UI preference", "rule": {"value": "^(dark|light)$"}}]"#,
    )
    .unwrap();

    let report = scan(
        &cli(
            &path,
            &["--labels", labels.to_str().unwrap(), "--exclude-paths", "*.contacts"],
        ),
        Registry::with_builtin_drivers().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(report.tables_sampled, vec![TablePath::new("main", "main", "settings")]);
    assert_eq!(report.classifications.len(), 1);
    assert_eq!(report.classifications[0].path.attribute, "value");
}

#[tokio::test]
async fn test_sqlite_scan_of_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.db");

    let result = scan(&cli(&path, &[]), Registry::with_builtin_drivers().unwrap()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_sqlite_scan_with_no_matching_tables() {
    let dir = TempDir::new().unwrap();
    let path = create_database(&dir).await;

    let report = scan(
        &cli(&path, &["--include-paths", "other.*"]),
        Registry::with_builtin_drivers().unwrap(),
    )
    .await
    .unwrap();

    assert!(report.tables_sampled.is_empty());
    assert!(report.classifications.is_empty());
}

#[tokio::test]
async fn test_scan_of_unknown_repo_type() {
    let cli = Cli::try_parse_from(["dmap-scan", "--repo-type", "cobol", "--host", "x"]).unwrap();

    let err = scan(&cli, Registry::with_builtin_drivers().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DmapError::UnsupportedRepoType { .. }));
}
