//! Reading archive.
//!
//! Every fetched reading can be kept in postgres (`telemetry.readings`).
//! The archive serves two purposes: comparing today's level with the same
//! instant in past flood years, and replaying a past period through the
//! monitor in development (`--replay-days`).
//!
//! The archive is optional and never fatal: callers log its errors and carry
//! on without it.

use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, Utc};
use postgres::{Client, NoTls};
use serde::Serialize;
use tracing::{debug, warn};

use crate::ingest::TelemetrySource;
use crate::model::{sort_newest_first, Reading};

/// How far from the requested instant `level_near` will look.
pub const NEAR_WINDOW_HOURS: i64 = 24;

/// Longest replay offset accepted by `ReplaySource`.
pub const MAX_REPLAY_DAYS: i64 = 36_500;

const SCHEMA_SQL: &str = "
    CREATE SCHEMA IF NOT EXISTS telemetry;
    CREATE TABLE IF NOT EXISTS telemetry.readings (
        station_id  TEXT             NOT NULL,
        measured_at TIMESTAMPTZ      NOT NULL,
        level_cm    DOUBLE PRECISION NOT NULL,
        flow_m3s    DOUBLE PRECISION,
        PRIMARY KEY (station_id, measured_at)
    );
";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("DATABASE_URL is not set")]
    MissingUrl,
    #[error("database error: {0}")]
    Db(#[from] postgres::Error),
    #[error("archive connection poisoned")]
    Poisoned,
    #[error("database did not answer within {0:?}")]
    Timeout(StdDuration),
    #[error("replay offset must be between 1 and {max} days, got {0}", max = MAX_REPLAY_DAYS)]
    InvalidReplayOffset(i64),
}

pub trait ReadingArchive {
    /// Store readings, ignoring ones already archived. Returns how many were new.
    fn record(&mut self, readings: &[Reading]) -> Result<u64, ArchiveError>;

    /// The archived level closest to `at`, within `NEAR_WINDOW_HOURS` either side.
    fn level_near(&mut self, station_id: &str, at: DateTime<Utc>) -> Result<Option<f64>, ArchiveError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgArchive {
    client: Client,
}

impl PgArchive {
    /// Connect, giving up after `timeout`. Every statement on the session is
    /// also cancelled server-side after `timeout`.
    pub fn connect(database_url: &str, timeout: StdDuration) -> Result<Self, ArchiveError> {
        let mut config: postgres::Config = database_url.parse()?;
        config
            .connect_timeout(timeout)
            .options(&format!("-c statement_timeout={}", timeout.as_millis()));

        // connect_timeout covers the TCP connect only; a server that accepts
        // and then stays silent would block the startup handshake forever.
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(config.connect(NoTls));
        });
        match rx.recv_timeout(timeout) {
            Ok(client) => Ok(Self { client: client? }),
            Err(_) => Err(ArchiveError::Timeout(timeout)),
        }
    }

    /// Connect using `DATABASE_URL` (loaded from `.env` by the binary).
    pub fn from_env(timeout: StdDuration) -> Result<Self, ArchiveError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| ArchiveError::MissingUrl)?;
        Self::connect(&url, timeout)
    }

    pub fn ensure_schema(&mut self) -> Result<(), ArchiveError> {
        self.client.batch_execute(SCHEMA_SQL)?;
        Ok(())
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl ReadingArchive for PgArchive {
    fn record(&mut self, readings: &[Reading]) -> Result<u64, ArchiveError> {
        if readings.is_empty() {
            return Ok(0);
        }
        let mut tx = self.client.transaction()?;
        let stmt = tx.prepare(
            "INSERT INTO telemetry.readings (station_id, measured_at, level_cm, flow_m3s)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (station_id, measured_at) DO NOTHING",
        )?;
        let mut inserted = 0;
        for r in readings {
            inserted += tx.execute(&stmt, &[&r.station_id, &r.timestamp, &r.level_cm, &r.flow_m3s])?;
        }
        tx.commit()?;
        debug!(inserted, offered = readings.len(), "readings archived");
        Ok(inserted)
    }

    fn level_near(&mut self, station_id: &str, at: DateTime<Utc>) -> Result<Option<f64>, ArchiveError> {
        let window = Duration::hours(NEAR_WINDOW_HOURS);
        let row = self.client.query_opt(
            "SELECT level_cm
             FROM telemetry.readings
             WHERE station_id = $1
               AND measured_at BETWEEN $2 AND $3
             ORDER BY ABS(EXTRACT(EPOCH FROM (measured_at - $4)))
             LIMIT 1",
            &[&station_id, &(at - window), &(at + window), &at],
        )?;
        Ok(row.map(|r| r.get::<_, f64>(0)))
    }
}

// ---------------------------------------------------------------------------
// In-memory archive
// ---------------------------------------------------------------------------

/// Archive held in a vector; for tests and runs without a database.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    readings: Vec<Reading>,
}

impl MemoryArchive {
    pub fn with_readings(readings: Vec<Reading>) -> Self {
        Self { readings }
    }
}

impl ReadingArchive for MemoryArchive {
    fn record(&mut self, readings: &[Reading]) -> Result<u64, ArchiveError> {
        let mut inserted = 0;
        for r in readings {
            let exists = self
                .readings
                .iter()
                .any(|k| k.station_id == r.station_id && k.timestamp == r.timestamp);
            if !exists {
                self.readings.push(r.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn level_near(&mut self, station_id: &str, at: DateTime<Utc>) -> Result<Option<f64>, ArchiveError> {
        let window = Duration::hours(NEAR_WINDOW_HOURS);
        Ok(self
            .readings
            .iter()
            .filter(|r| r.station_id == station_id && (r.timestamp - at).abs() <= window)
            .min_by_key(|r| (r.timestamp - at).abs())
            .map(|r| r.level_cm))
    }
}

// ---------------------------------------------------------------------------
// Historical comparison
// ---------------------------------------------------------------------------

/// The local level at the same calendar instant in a past year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalLevel {
    pub year: i32,
    pub level_cm: Option<f64>,
}

impl HistoricalLevel {
    /// `"2020: 812cm"` or `"2020: N/A"`.
    pub fn label(&self) -> String {
        match self.level_cm {
            Some(level) => format!("{}: {:.0}cm", self.year, level),
            None => format!("{}: N/A", self.year),
        }
    }
}

/// Level at `now` shifted into each of `years`. Lookup failures and dates
/// that do not exist in the target year (29 February) yield `None`.
pub fn compare_with_years(
    archive: &mut dyn ReadingArchive,
    station_id: &str,
    now: DateTime<Utc>,
    years: &[i32],
) -> Vec<HistoricalLevel> {
    years
        .iter()
        .map(|&year| {
            let level_cm = match now.with_year(year) {
                Some(at) => archive.level_near(station_id, at).unwrap_or_else(|e| {
                    warn!(station = station_id, year, error = %e, "historical lookup failed");
                    None
                }),
                None => None,
            };
            HistoricalLevel { year, level_cm }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Replay (development mode)
// ---------------------------------------------------------------------------

/// Serves archived readings as if they were live, a fixed number of days late.
///
/// A fetch for `[from, to]` returns what was archived for
/// `[from - offset, to - offset]`, with timestamps moved forward by the offset.
pub struct ReplaySource {
    client: Mutex<Client>,
    shift: Duration,
}

/// The replay shift for `days`. Offsets outside `1..=MAX_REPLAY_DAYS` are
/// rejected before they reach chrono's panicking arithmetic.
pub fn replay_shift(days: i64) -> Result<Duration, ArchiveError> {
    if !(1..=MAX_REPLAY_DAYS).contains(&days) {
        return Err(ArchiveError::InvalidReplayOffset(days));
    }
    Duration::try_days(days).ok_or(ArchiveError::InvalidReplayOffset(days))
}

impl ReplaySource {
    pub fn new(client: Client, days_offset: i64) -> Result<Self, ArchiveError> {
        Ok(Self {
            client: Mutex::new(client),
            shift: replay_shift(days_offset)?,
        })
    }

    pub fn days_offset(&self) -> i64 {
        self.shift.num_days()
    }

    /// Earliest and latest archived reading for a station.
    pub fn data_range(&self, station_id: &str) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, ArchiveError> {
        let mut client = self.client.lock().map_err(|_| ArchiveError::Poisoned)?;
        let row = client.query_one(
            "SELECT MIN(measured_at), MAX(measured_at)
             FROM telemetry.readings
             WHERE station_id = $1",
            &[&station_id],
        )?;
        let min: Option<DateTime<Utc>> = row.get(0);
        let max: Option<DateTime<Utc>> = row.get(1);
        Ok(min.zip(max))
    }

    fn query_shifted(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, ArchiveError> {
        let shift = self.shift;
        let mut client = self.client.lock().map_err(|_| ArchiveError::Poisoned)?;
        let rows = client.query(
            "SELECT station_id, measured_at, level_cm, flow_m3s
             FROM telemetry.readings
             WHERE station_id = $1
               AND measured_at >= $2
               AND measured_at <= $3
             ORDER BY measured_at DESC",
            &[&station_id, &(from - shift), &(to - shift)],
        )?;

        let readings = rows
            .iter()
            .map(|row| Reading {
                station_id: row.get(0),
                timestamp: row.get::<_, DateTime<Utc>>(1) + shift,
                level_cm: row.get(2),
                flow_m3s: row.get(3),
            })
            .collect();
        Ok(readings)
    }
}

impl TelemetrySource for ReplaySource {
    fn fetch(&self, station_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Reading> {
        match self.query_shifted(station_id, from, to) {
            Ok(mut readings) => {
                sort_newest_first(&mut readings);
                readings
            }
            Err(e) => {
                warn!(station = station_id, error = %e, "replay fetch failed");
                Vec::new()
            }
        }
    }
}
