//! Report output: stdout, plain JSON files, or Zstandard-compressed files.

use crate::report::ScanReport;
use dmap_core::{DmapError, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Serializes `report` and writes it to `output_path`, or to stdout when no
/// path is given.
///
/// # Errors
/// Compression requires an output file and the `compression` feature.
pub async fn save_report(
    report: &ScanReport,
    output_path: Option<&Path>,
    compress: bool,
) -> Result<()> {
    let json_data = serde_json::to_string_pretty(report).map_err(|e| DmapError::Serialization {
        context: "scan report".to_string(),
        source: e,
    })?;

    match output_path {
        None if compress => Err(DmapError::configuration(
            "--compress requires --output",
        )),
        None => write_stdout(&json_data).await,
        Some(path) if compress => {
            #[cfg(feature = "compression")]
            {
                save_compressed(&json_data, path).await
            }
            #[cfg(not(feature = "compression"))]
            {
                let _ = path;
                Err(DmapError::configuration(
                    "Compression not available. Compile with --features compression",
                ))
            }
        }
        Some(path) => save_json(&json_data, path).await,
    }
}

async fn write_stdout(json_data: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let write = async {
        stdout.write_all(json_data.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    };
    write.await.map_err(|e| DmapError::Io {
        context: "Failed to write report to stdout".to_string(),
        source: e,
    })
}

/// Saves JSON data to file.
pub async fn save_json(json_data: &str, output_path: &Path) -> Result<()> {
    tokio::fs::write(output_path, json_data)
        .await
        .map_err(|e| DmapError::Io {
            context: format!("Failed to write to {}", output_path.display()),
            source: e,
        })
}

/// Saves compressed JSON data.
#[cfg(feature = "compression")]
pub async fn save_compressed(json_data: &str, output_path: &Path) -> Result<()> {
    let compressed_data = zstd::encode_all(json_data.as_bytes(), 3).map_err(|e| DmapError::Io {
        context: "Compression failed".to_string(),
        source: e,
    })?;

    tokio::fs::write(output_path, compressed_data)
        .await
        .map_err(|e| DmapError::Io {
            context: format!(
                "Failed to write compressed file to {}",
                output_path.display()
            ),
            source: e,
        })
}
