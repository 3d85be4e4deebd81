use crate::model::UnitRecord;
use crate::sink::{RecordSink, SinkError};
use chrono::{DateTime, Utc};
use harvest_scanner::ListingUrl;
use rusqlite::{Connection, Result, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub id: String,
    pub site: String,
    pub created_at: i64,
    pub record_count: i64,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.connection().execute_batch(
            "
CREATE TABLE IF NOT EXISTS harvest_runs (
    id TEXT PRIMARY KEY,
    site TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    site TEXT NOT NULL,
    property_name TEXT NOT NULL,
    address TEXT NOT NULL,
    listing_url TEXT NOT NULL,
    floor_suite TEXT NOT NULL,
    space_available TEXT NOT NULL,
    price TEXT NOT NULL,
    observed_at TEXT NOT NULL,      -- RFC 3339

    FOREIGN KEY(run_id) REFERENCES harvest_runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_listings_run ON listings(run_id);
CREATE INDEX IF NOT EXISTS idx_listings_site ON listings(site);
CREATE INDEX IF NOT EXISTS idx_listings_url ON listings(listing_url);
            ",
        )?;
        Ok(())
    }

    /// Store one site's records under a new run id.
    pub fn insert_run(&self, site: &str, records: &[UnitRecord]) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO harvest_runs (id, site, created_at, record_count) VALUES (?1, ?2, ?3, ?4)",
            params![&run_id, site, current_timestamp(), records.len() as i64],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO listings (run_id, site, property_name, address, listing_url,
                                       floor_suite, space_available, price, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for record in records {
                stmt.execute(params![
                    &run_id,
                    site,
                    record.property_name,
                    record.address,
                    record.listing_url.as_str(),
                    record.floor_or_suite,
                    record.space_available,
                    record.price,
                    record.observed_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(run_id)
    }

    pub fn get_runs(&self) -> Result<Vec<RunRow>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, site, created_at, record_count FROM harvest_runs
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                site: row.get(1)?,
                created_at: row.get(2)?,
                record_count: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn get_records_by_run(&self, run_id: &str) -> Result<Vec<UnitRecord>> {
        self.query_records(
            "SELECT property_name, address, listing_url, floor_suite, space_available, price,
                    observed_at
             FROM listings WHERE run_id = ?1 ORDER BY id",
            run_id,
        )
    }

    pub fn get_records_by_site(&self, site: &str) -> Result<Vec<UnitRecord>> {
        self.query_records(
            "SELECT property_name, address, listing_url, floor_suite, space_available, price,
                    observed_at
             FROM listings WHERE site = ?1 ORDER BY id",
            site,
        )
    }

    pub fn count_records(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))
    }

    fn query_records(&self, sql: &str, key: &str) -> Result<Vec<UnitRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([key], |row| {
            let url: String = row.get(2)?;
            let observed: String = row.get(6)?;
            Ok(UnitRecord {
                property_name: row.get(0)?,
                address: row.get(1)?,
                listing_url: ListingUrl::parse(&url).map_err(|e| text_conversion(2, e))?,
                floor_or_suite: row.get(3)?,
                space_available: row.get(4)?,
                price: row.get(5)?,
                observed_at: DateTime::parse_from_rfc3339(&observed)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|e| text_conversion(6, e))?,
            })
        })?;
        rows.collect()
    }
}

fn text_conversion<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

impl RecordSink for Database {
    fn persist(
        &self,
        site: &str,
        records: &[UnitRecord],
    ) -> std::result::Result<String, SinkError> {
        let run_id = self.insert_run(site, records)?;
        Ok(format!("{}#run={}", self.path.display(), run_id))
    }
}
