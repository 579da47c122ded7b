use std::fs::File;
use std::path::Path;

use serde::Serialize;
use store_core::error::{Result, StoreError};
use tracing::debug;

/// Write `records` to `path` as CSV with an explicit header row.
///
/// The header is written even when `records` is empty so downstream readers
/// always see the full column set. Parent directories are created as needed.
pub fn write_records<T: Serialize>(path: &Path, columns: &[&str], records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let file = File::create(path).map_err(|source| StoreError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    let csv_err = |source: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    wtr.write_record(columns).map_err(csv_err)?;
    for record in records {
        wtr.serialize(record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| StoreError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}
