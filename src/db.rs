use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::DateTime;
use rusqlite::Connection;

use crate::{
    error::StoreError,
    observation::{AtmosphericReading, Observation, RainReading, StoredObservation, WindReading},
};

pub const DEFAULT_DB_FILE: &str = "./weather-station.db";

/// Inclusive timestamp range of rows to mark as published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishRange {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    /// Rows with a larger id were inserted after the batch was read and are
    /// left untouched.
    pub max_row_id: Option<i64>,
}

impl PublishRange {
    #[cfg(test)]
    pub fn new(min_timestamp: i64, max_timestamp: i64) -> Self {
        Self {
            min_timestamp,
            max_timestamp,
            max_row_id: None,
        }
    }

    /// Range covering exactly the rows of a batch ordered by timestamp.
    pub fn for_batch(batch: &[StoredObservation]) -> Option<Self> {
        let first = batch.first()?;
        let last = batch.last()?;

        Some(Self {
            min_timestamp: first.observation.timestamp.timestamp(),
            max_timestamp: last.observation.timestamp.timestamp(),
            max_row_id: batch.iter().map(|row| row.id).max(),
        })
    }
}

pub trait ObservationStore: Send + Sync {
    fn write(&self, observation: &Observation) -> Result<(), StoreError>;

    /// Unpublished rows, oldest first.
    fn read_unpublished(&self) -> Result<Vec<StoredObservation>, StoreError>;

    fn mark_published(&self, range: &PublishRange) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens the database at `path` and creates the table if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Self::new(path)?;
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                wind_speed REAL NOT NULL,
                wind_direction REAL NOT NULL,
                wind_gust_speed REAL NOT NULL,
                rainfall REAL NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL,
                pressure REAL NOT NULL,
                interval_secs INTEGER NOT NULL,
                published BOOLEAN NOT NULL DEFAULT false
            );
            CREATE INDEX IF NOT EXISTS observations_published_timestamp
                ON observations (published, timestamp);
            ",
        )?;
        Ok(())
    }
}

impl ObservationStore for DB {
    fn write(&self, data: &Observation) -> Result<(), StoreError> {
        self.conn().execute(
            r"
            INSERT INTO observations (timestamp, wind_speed, wind_direction, wind_gust_speed,
                rainfall, temperature, humidity, pressure, interval_secs, published)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                data.timestamp.timestamp(),
                data.wind.speed,
                data.wind.direction,
                data.wind.gust,
                data.rain.rainfall,
                data.atmospheric.temperature,
                data.atmospheric.humidity,
                data.atmospheric.pressure,
                data.interval_seconds as i64,
                data.published,
            ],
        )?;
        Ok(())
    }

    fn read_unpublished(&self) -> Result<Vec<StoredObservation>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r"
            SELECT id, timestamp, wind_speed, wind_direction, wind_gust_speed,
                rainfall, temperature, humidity, pressure, interval_secs, published
            FROM observations
            WHERE published = false
            ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                WindReading {
                    speed: row.get(2)?,
                    direction: row.get(3)?,
                    gust: row.get(4)?,
                },
                RainReading {
                    rainfall: row.get(5)?,
                },
                AtmosphericReading {
                    temperature: row.get(6)?,
                    humidity: row.get(7)?,
                    pressure: row.get(8)?,
                },
                row.get::<_, i64>(9)?,
                row.get::<_, bool>(10)?,
            ))
        })?;

        let mut observations = Vec::new();
        for row in rows {
            let (id, timestamp, wind, rain, atmospheric, interval_secs, published) = row?;
            let timestamp = DateTime::from_timestamp(timestamp, 0)
                .ok_or(StoreError::InvalidTimestamp(timestamp))?;

            observations.push(StoredObservation {
                id,
                observation: Observation {
                    timestamp,
                    atmospheric,
                    wind,
                    rain,
                    interval_seconds: interval_secs.max(0) as u64,
                    published,
                },
            });
        }

        Ok(observations)
    }

    fn mark_published(&self, range: &PublishRange) -> Result<(), StoreError> {
        self.conn().execute(
            r"
            UPDATE observations SET published = true
            WHERE published = false AND timestamp BETWEEN ?1 AND ?2 AND id <= ?3",
            rusqlite::params![
                range.min_timestamp,
                range.max_timestamp,
                range.max_row_id.unwrap_or(i64::MAX),
            ],
        )?;
        Ok(())
    }
}
