//! Structured logging for the flood monitoring service.
//!
//! Console output goes to stderr; an optional log file receives the same
//! events without ANSI colours for daemon operation. `RUST_LOG` overrides the
//! configured level when set.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::model::TelemetryError;

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber. Call once, early in `main`.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let console = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("logging already initialized")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Station offline or in maintenance; normal for ANA telemetry.
    Expected,
    /// Service degradation, API change or configuration issue.
    Unexpected,
    /// Cannot tell from the error alone.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a telemetry failure so an offline gauge does not page anyone
/// while a broken endpoint does.
pub fn classify_telemetry_failure(err: &TelemetryError) -> FailureType {
    match err {
        // Unknown station codes come back as 404 from the ANA service
        TelemetryError::HttpStatus(404) => FailureType::Expected,
        TelemetryError::HttpStatus(_) => FailureType::Unexpected,
        TelemetryError::Transport(_) => FailureType::Unexpected,
        TelemetryError::Parse(_) => FailureType::Unexpected,
        // An empty window usually means the station is down
        TelemetryError::NoData(_) => FailureType::Unknown,
    }
}

/// Log a telemetry failure at the level its classification deserves.
pub fn log_telemetry_failure(station_id: &str, operation: &str, err: &TelemetryError) {
    let failure_type = classify_telemetry_failure(err);
    match failure_type {
        FailureType::Expected => {
            debug!(station = station_id, %failure_type, error = %err, "{} failed", operation)
        }
        FailureType::Unexpected => {
            error!(station = station_id, %failure_type, error = %err, "{} failed", operation)
        }
        FailureType::Unknown => {
            warn!(station = station_id, %failure_type, error = %err, "{} failed", operation)
        }
    }
}

/// Summarise one polling round across all stations.
pub fn log_fetch_summary(total: usize, successful: usize) {
    let failed = total.saturating_sub(successful);
    if failed == 0 {
        info!(total, successful, "telemetry fetch complete");
    } else if successful == 0 {
        error!(total, failed, "telemetry fetch failed for every station");
    } else {
        warn!(total, successful, failed, "telemetry fetch partially failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_telemetry_failure(&TelemetryError::NoData("56696000".into())),
            FailureType::Unknown
        );
        assert_eq!(
            classify_telemetry_failure(&TelemetryError::HttpStatus(500)),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_telemetry_failure(&TelemetryError::HttpStatus(404)),
            FailureType::Expected
        );
        assert_eq!(
            classify_telemetry_failure(&TelemetryError::Parse("bad <Nivel>".into())),
            FailureType::Unexpected
        );
    }

    #[test]
    fn test_failure_type_display() {
        assert_eq!(FailureType::Unexpected.to_string(), "UNEXPECTED");
    }
}
