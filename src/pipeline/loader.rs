//! Dataset loader for local CSV/Parquet files and remote CSV downloads

use anyhow::{Context, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// CDC weekly counts of deaths by jurisdiction and select causes
pub const DEFAULT_MORTALITY_SOURCE: &str =
    "https://data.cdc.gov/api/views/muzy-jte6/rows.csv?accessType=DOWNLOAD";

/// BEA quarterly population by state
pub const DEFAULT_POPULATION_SOURCE: &str =
    "https://raw.githubusercontent.com/LokeshDondapati/Mortality_Analysis/main/Datasets/BEA%20Population%20Data.csv";

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn schema_length(infer_schema_length: usize) -> Option<usize> {
    // 0 means full table scan
    if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    }
}

/// Load a table from a URL or a file path, fully materialized
pub fn load_table(source: &str, infer_schema_length: usize) -> Result<DataFrame> {
    let df = if is_remote(source) {
        fetch_csv(source, infer_schema_length)?
    } else {
        load_dataset(Path::new(source), infer_schema_length)?
            .collect()
            .with_context(|| format!("Failed to read dataset: {}", source))?
    };

    tracing::info!(source, rows = df.height(), cols = df.width(), "loaded table");
    Ok(df)
}

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(schema_length(infer_schema_length))
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Download a CSV body and parse it in memory
fn fetch_csv(url: &str, infer_schema_length: usize) -> Result<DataFrame> {
    tracing::debug!(url, "downloading");
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to download: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Failed to download {}: HTTP status {}", url, status);
    }

    let body = response
        .bytes()
        .with_context(|| format!("Failed to read response body: {}", url))?;

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(schema_length(infer_schema_length))
        .into_reader_with_file_handle(Cursor::new(body.to_vec()))
        .finish()
        .with_context(|| format!("Failed to parse CSV downloaded from {}", url))
}

/// Rows, columns and estimated memory in MB
pub fn dataset_stats(df: &DataFrame) -> (usize, usize, f64) {
    let (rows, cols) = df.shape();
    let memory_mb = df.estimated_size() as f64 / (1024.0 * 1024.0);
    (rows, cols, memory_mb)
}

/// Save dataset to file (CSV or Parquet based on extension)
pub fn save_dataset(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}
