//! Snapshot cache over a pluggable key/value storage backend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::{Clock, SystemClock};
use crate::location::SavedCoordinateSource;
use crate::types::{
    CacheRecord, CacheStatus, Coordinate, CoordinateSource, FetchErrorKind, Snapshot,
    WeatherError,
};

/// Age past which a fresh record is worded as stale
pub const STALENESS_SECONDS: i64 = 120;

const KEY_LAT: &str = "coord.lat";
const KEY_LON: &str = "coord.lon";
const KEY_SOURCE: &str = "coord.source";
const KEY_OBSERVED_AT: &str = "coord.observed_at";
const KEY_SNAPSHOT: &str = "snapshot";
const KEY_FETCHED_AT: &str = "fetched_at";
const KEY_STATUS: &str = "status";

const COORDINATE_KEYS: [&str; 4] = [KEY_LAT, KEY_LON, KEY_SOURCE, KEY_OBSERVED_AT];
const RECORD_KEYS: [&str; 3] = [KEY_SNAPSHOT, KEY_FETCHED_AT, KEY_STATUS];

/// Opaque string key/value store. Batches are applied atomically.
pub trait CacheStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, WeatherError>;
    fn put(&mut self, entries: &[(&str, String)]) -> Result<(), WeatherError>;
    fn remove(&mut self, keys: &[&str]) -> Result<(), WeatherError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, WeatherError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, entries: &[(&str, String)]) -> Result<(), WeatherError> {
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), WeatherError> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// SQLite-backed key/value table.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, WeatherError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let storage = Self {
            conn: Connection::open(path)?,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, WeatherError> {
        let storage = Self {
            conn: Connection::open_in_memory()?,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), WeatherError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS widget_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl CacheStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, WeatherError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM widget_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, entries: &[(&str, String)]) -> Result<(), WeatherError> {
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO widget_kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), WeatherError> {
        let tx = self.conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM widget_kv WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// The last good snapshot, the outcome of the latest fetch and the saved
/// coordinate. Every access goes through one lock.
pub struct WeatherCache {
    storage: Mutex<Box<dyn CacheStorage>>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
}

impl WeatherCache {
    pub fn new(storage: Box<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Mutex::new(storage),
            clock,
            staleness: Duration::seconds(STALENESS_SECONDS),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()), Arc::new(SystemClock))
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Current record. Unreadable storage reads as empty.
    pub fn load(&self) -> CacheRecord {
        let storage = self.storage.lock();
        match read_record(&**storage) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to read weather cache, treating as empty: {}", e);
                CacheRecord::empty()
            }
        }
    }

    /// Replace the record with a fresh snapshot fetched now.
    pub fn store(&self, snapshot: &Snapshot) -> Result<CacheRecord, WeatherError> {
        let now = self.clock.now();
        let status = CacheStatus::Fresh;
        let entries = [
            (KEY_SNAPSHOT, serde_json::to_string(snapshot)?),
            (KEY_FETCHED_AT, now.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            (KEY_STATUS, serde_json::to_string(&status)?),
        ];
        self.storage.lock().put(&entries)?;
        Ok(CacheRecord::fresh(snapshot.clone(), now))
    }

    /// Record a failed fetch; any existing snapshot is kept.
    pub fn mark_error(&self, kind: FetchErrorKind) -> Result<(), WeatherError> {
        let status = serde_json::to_string(&CacheStatus::Error(kind))?;
        self.storage.lock().put(&[(KEY_STATUS, status)])
    }

    /// Drop the snapshot together with the coordinate it was fetched for.
    pub fn clear(&self) -> Result<(), WeatherError> {
        let keys: Vec<&str> = RECORD_KEYS.iter().chain(COORDINATE_KEYS.iter()).copied().collect();
        self.storage.lock().remove(&keys)?;
        tracing::info!("Weather cache cleared");
        Ok(())
    }

    /// Time since the record's fetch; `None` when nothing was ever fetched.
    pub fn age_of(&self, record: &CacheRecord) -> Option<Duration> {
        record
            .fetched_at
            .map(|at| (self.clock.now() - at).max(Duration::zero()))
    }

    /// Status adjusted for staleness.
    pub fn display_status(&self, record: &CacheRecord) -> CacheStatus {
        record.display_status(self.age_of(record), self.staleness)
    }

    pub fn save_coordinate(&self, coordinate: &Coordinate) -> Result<(), WeatherError> {
        let entries = [
            (KEY_LAT, coordinate.latitude.to_string()),
            (KEY_LON, coordinate.longitude.to_string()),
            (KEY_SOURCE, coordinate.source.as_str().to_string()),
            (
                KEY_OBSERVED_AT,
                coordinate
                    .observed_at
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
            ),
        ];
        self.storage.lock().put(&entries)
    }

    /// The saved coordinate, if one is stored and readable.
    pub fn load_coordinate(&self) -> Result<Option<Coordinate>, WeatherError> {
        let storage = self.storage.lock();
        let (Some(lat), Some(lon), Some(observed_at)) = (
            storage.get(KEY_LAT)?,
            storage.get(KEY_LON)?,
            storage.get(KEY_OBSERVED_AT)?,
        ) else {
            return Ok(None);
        };
        let source = storage
            .get(KEY_SOURCE)?
            .map(|s| CoordinateSource::parse(&s))
            .unwrap_or_default();

        let (Ok(latitude), Ok(longitude), Some(observed_at)) =
            (lat.parse::<f64>(), lon.parse::<f64>(), parse_time(&observed_at))
        else {
            tracing::warn!("Ignoring unreadable saved coordinate");
            return Ok(None);
        };

        Ok(Some(Coordinate::new(latitude, longitude, observed_at, source)))
    }
}

impl SavedCoordinateSource for WeatherCache {
    fn saved_coordinate(&self) -> Option<Coordinate> {
        match self.load_coordinate() {
            Ok(coordinate) => coordinate,
            Err(e) => {
                tracing::warn!("Failed to read saved coordinate: {}", e);
                None
            }
        }
    }
}

fn read_record(storage: &dyn CacheStorage) -> Result<CacheRecord, WeatherError> {
    let snapshot = match storage.get(KEY_SNAPSHOT)? {
        Some(json) => match serde_json::from_str::<Snapshot>(&json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Discarding corrupt cached snapshot: {}", e);
                None
            }
        },
        None => None,
    };

    let stored_status = storage
        .get(KEY_STATUS)?
        .and_then(|s| serde_json::from_str::<CacheStatus>(&s).ok());

    let status = match (stored_status, &snapshot) {
        (Some(status), _) => status,
        (None, Some(_)) => CacheStatus::Fresh,
        (None, None) => CacheStatus::Empty,
    };

    let fetched_at = storage.get(KEY_FETCHED_AT)?.and_then(|s| parse_time(&s));

    Ok(CacheRecord {
        snapshot,
        status,
        fetched_at,
    })
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
