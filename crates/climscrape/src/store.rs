use std::path::Path;

use rusqlite::{Connection, ErrorCode, params};
use serde::Serialize;

use crate::types::{DateKey, DateKeyParseError, MonthlyDataset, YearMonth};

pub const DEFAULT_LOCATION: &str = "Winnipeg, MB";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Sample date {0} is already stored")]
    DuplicateKey(String),
    #[error("Stored sample date is malformed: {0}")]
    MalformedDate(#[from] DateKeyParseError),
}

/// Where crawled months end up.
pub trait WeatherStore {
    /// The latest stored day, or `None` when nothing has been stored yet.
    fn most_recent_date(&self) -> Result<Option<DateKey>, StoreError>;

    /// Stores every record of `dataset`, returning how many rows were written.
    fn insert_many(&mut self, dataset: &MonthlyDataset) -> Result<usize, StoreError>;

    fn row_count(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMean {
    pub date: String,
    pub mean: f64,
}

impl DailyMean {
    pub fn day(&self) -> Option<u32> {
        self.date.rsplit('-').next()?.parse().ok()
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    location: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn,
            location: DEFAULT_LOCATION.to_string(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Label written into the `location` column of new rows.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS weather (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                sample_date TEXT NOT NULL UNIQUE,
                location TEXT NOT NULL,
                min_temp REAL NOT NULL,
                max_temp REAL NOT NULL,
                avg_temp REAL NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Drops every stored row by recreating the table.
    pub fn purge(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("DROP TABLE IF EXISTS weather;")?;
        self.initialize()
    }

    pub fn daily_means(&self, period: YearMonth) -> Result<Vec<DailyMean>, StoreError> {
        let start = format!("{}-{:02}-01", period.year(), period.month());
        let end = format!("{}-{:02}-31", period.year(), period.month());

        let mut stmt = self.conn.prepare(
            "SELECT sample_date, avg_temp FROM weather
             WHERE sample_date BETWEEN ?1 AND ?2
             ORDER BY sample_date",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(DailyMean {
                date: row.get(0)?,
                mean: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Mean temperatures between two years inclusive, bucketed January..December.
    pub fn monthly_means(&self, start_year: i32, end_year: i32) -> Result<[Vec<f64>; 12], StoreError> {
        let start = format!("{}-01-01", start_year);
        let end = format!("{}-12-31", end_year);

        let mut stmt = self.conn.prepare(
            "SELECT CAST(substr(sample_date, 6, 2) AS INTEGER), avg_temp FROM weather
             WHERE sample_date BETWEEN ?1 AND ?2
             ORDER BY sample_date",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut buckets: [Vec<f64>; 12] = Default::default();
        for row in rows {
            let (month, mean) = row?;
            match month.checked_sub(1).and_then(|i| buckets.get_mut(i as usize)) {
                Some(bucket) => bucket.push(mean),
                None => log::warn!("Ignoring row with unexpected month {}", month),
            }
        }

        Ok(buckets)
    }
}

impl WeatherStore for SqliteStore {
    fn most_recent_date(&self) -> Result<Option<DateKey>, StoreError> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(sample_date) FROM weather", [], |row| row.get(0))?;

        Ok(latest.map(|date| date.parse::<DateKey>()).transpose()?)
    }

    fn insert_many(&mut self, dataset: &MonthlyDataset) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO weather (sample_date, max_temp, min_temp, avg_temp, location)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for (key, record) in dataset {
                let Some(sample_date) = key.sample_date() else {
                    log::warn!("Skipping {}: day is not a number", key);
                    continue;
                };

                let temps = match record.temperatures() {
                    Ok(temps) => temps,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", key, e);
                        continue;
                    }
                };

                stmt.execute(params![
                    sample_date,
                    temps.max,
                    temps.min,
                    temps.mean,
                    self.location
                ])
                .map_err(|e| insert_error(e, &sample_date))?;
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn row_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM weather", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn insert_error(error: rusqlite::Error, sample_date: &str) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            log::error!("Duplicate sample date {}", sample_date);
            StoreError::DuplicateKey(sample_date.to_string())
        }
        other => StoreError::Database(other),
    }
}
