use crate::model::UnitRecord;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Destination for one site's finished record collection.
pub trait RecordSink: Send + Sync {
    /// Store `records` and return where they went.
    fn persist(&self, site: &str, records: &[UnitRecord]) -> Result<String, SinkError>;
}

/// Writes `{dir}/{site}_properties_{timestamp}.json`, one pretty-printed
/// array per run. The timestamp carries microseconds; a name that is still
/// taken gets a `_{n}` suffix, so no run overwrites another's file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_stem(site: &str) -> String {
        format!("{}_properties_{}", site, Local::now().format("%Y%m%d_%H%M%S_%6f"))
    }

    /// Create a file that did not exist before.
    fn create_unique(&self, site: &str) -> std::io::Result<(PathBuf, fs::File)> {
        let stem = Self::file_stem(site);
        let mut suffix = 0;
        loop {
            let name = match suffix {
                0 => format!("{}.json", stem),
                n => format!("{}_{}.json", stem, n),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

impl RecordSink for JsonFileSink {
    fn persist(&self, site: &str, records: &[UnitRecord]) -> Result<String, SinkError> {
        let io_error = |path: &Path| {
            let path = path.display().to_string();
            move |source| SinkError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let json = serde_json::to_string_pretty(records)?;
        let (path, mut file) = self.create_unique(site).map_err(io_error(&self.dir))?;
        file.write_all(json.as_bytes()).map_err(io_error(&path))?;

        info!("Wrote {} {} records to {}", records.len(), site, path.display());
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use harvest_scanner::ListingUrl;
    use tempfile::TempDir;

    fn record(suite: &str) -> UnitRecord {
        UnitRecord {
            property_name: "Tower".into(),
            address: "1 Main St".into(),
            listing_url: ListingUrl::parse("https://x.example/p/1").unwrap(),
            floor_or_suite: suite.into(),
            space_available: "1,000 SF".into(),
            price: "$20/SF".into(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_writes_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(temp_dir.path().join("out"));

        let path = sink.persist("cbre", &[record("100"), record("200")]).unwrap();

        assert!(path.contains("cbre_properties_"));
        assert!(path.ends_with(".json"));
        let written: Vec<UnitRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1].floor_or_suite, "200");
    }

    #[test]
    fn test_back_to_back_runs_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(temp_dir.path());

        let first = sink.persist("lee", &[record("100")]).unwrap();
        let second = sink.persist("lee", &[record("200")]).unwrap();

        assert_ne!(first, second);
        let first_written: Vec<UnitRecord> =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(first_written[0].floor_or_suite, "100");
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_empty_collection_still_written() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(temp_dir.path());

        let path = sink.persist("jll", &[]).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap().trim(), "[]");
    }
}
