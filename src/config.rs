//! Service configuration.
//!
//! Loaded once at startup from a TOML file (default `floodwatch.toml`).
//! Every alerting threshold is a named static value; none is derived at
//! runtime. The `[thresholds]` table has no defaults: a missing key is a
//! parse error and aborts startup, as does any value that fails validation.

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::{Severity, StationRole};
use crate::stations;

pub const DEFAULT_CONFIG_PATH: &str = "floodwatch.toml";

/// Longest accepted polling interval, re-notify interval or staleness limit.
pub const MAX_INTERVAL_MINUTES: i64 = 7 * 24 * 60;
/// Longest accepted fetch window.
pub const MAX_LOOKBACK_HOURS: i64 = 31 * 24;

const ANA_TELEMETRY_URL: &str =
    "http://telemetriaws1.ana.gov.br/ServiceANA.asmx/DadosHidrometeorologicos";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stations: StationsConfig,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub routine: RoutineWindow,
    #[serde(default)]
    pub reinterval: ReintervalPolicy,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationsConfig {
    pub local: String,
    pub upstream_short: String,
    pub upstream_long: String,
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            local: stations::default_code(StationRole::Local).to_string(),
            upstream_short: stations::default_code(StationRole::UpstreamShortHorizon).to_string(),
            upstream_long: stations::default_code(StationRole::UpstreamLongHorizon).to_string(),
        }
    }
}

/// Alerting thresholds. All required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Thresholds {
    /// Local level at which residents of the lowest streets should prepare.
    pub alert_level_cm: f64,
    /// Local level at which critical streets are flooded.
    pub severe_level_cm: f64,
    pub moderate_velocity_cm_h: f64,
    pub panic_velocity_cm_h: f64,
    /// Jump between two consecutive short-horizon readings that signals
    /// floodgates opening upstream.
    pub upstream_critical_delta_cm: f64,
    pub upstream_long_velocity_cm_h: f64,
    /// Routine bulletins at or above this level are labelled `watch`.
    #[serde(default)]
    pub watch_level_cm: Option<f64>,
}

/// Fixed daily windows for routine bulletins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoutineWindow {
    /// Local wall-clock hours that open a window.
    pub hours: Vec<u32>,
    /// A window stays open through this minute of the hour (inclusive).
    pub minute_cutoff: u32,
    /// Minimum gap since any previous notification before a routine
    /// bulletin may go out.
    pub min_gap_minutes: i64,
}

impl Default for RoutineWindow {
    fn default() -> Self {
        Self {
            hours: vec![7, 19],
            minute_cutoff: 25,
            min_gap_minutes: 60,
        }
    }
}

impl RoutineWindow {
    pub fn contains(&self, hour: u32, minute: u32) -> bool {
        self.hours.contains(&hour) && minute <= self.minute_cutoff
    }
}

/// Minimum re-notify interval per severity, in minutes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReintervalPolicy {
    pub critical_minutes: i64,
    pub warning_minutes: i64,
    pub watch_minutes: i64,
    pub routine_minutes: i64,
}

impl Default for ReintervalPolicy {
    fn default() -> Self {
        Self {
            critical_minutes: 15,
            warning_minutes: 30,
            watch_minutes: 720,
            routine_minutes: 720,
        }
    }
}

impl ReintervalPolicy {
    pub fn for_severity(&self, severity: Severity) -> i64 {
        match severity {
            Severity::Critical => self.critical_minutes,
            Severity::Warning => self.warning_minutes,
            Severity::Watch => self.watch_minutes,
            Severity::Routine => self.routine_minutes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_minutes: u64,
    pub fetch_timeout_secs: u64,
    /// How far back each fetch reaches.
    pub lookback_hours: i64,
    /// Offset of the stations' wall clock from UTC. Also used for the
    /// routine windows.
    pub utc_offset_hours: i32,
    pub stale_after_minutes: i64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            fetch_timeout_secs: 20,
            lookback_hours: 24,
            utc_offset_hours: -3,
            stale_after_minutes: 180,
        }
    }
}

impl PollingConfig {
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub base_url: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: ANA_TELEMETRY_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Below this level a falling river is not worth calling a recession.
    pub recession_floor_cm: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recession_floor_cm: 400.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
    /// Published artifacts kept live before the oldest are cleared.
    pub story_cap: u32,
    /// Artifacts produced by each notification.
    pub stories_per_post: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("notification_state.json"),
            story_cap: 9,
            stories_per_post: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub outbox_path: PathBuf,
    pub webhook_url: Option<String>,
    pub webhook_min_severity: Severity,
    pub webhook_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            outbox_path: PathBuf::from("outbox.jsonl"),
            webhook_url: None,
            webhook_min_severity: Severity::Warning,
            webhook_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub enabled: bool,
    /// Past years shown next to the current level in notifications.
    pub comparison_years: Vec<i32>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            comparison_years: vec![2020, 2022],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let named = [
            ("alert_level_cm", t.alert_level_cm),
            ("severe_level_cm", t.severe_level_cm),
            ("moderate_velocity_cm_h", t.moderate_velocity_cm_h),
            ("panic_velocity_cm_h", t.panic_velocity_cm_h),
            ("upstream_critical_delta_cm", t.upstream_critical_delta_cm),
            ("upstream_long_velocity_cm_h", t.upstream_long_velocity_cm_h),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("thresholds.{} must be positive, got {}", name, value)));
            }
        }
        if t.alert_level_cm >= t.severe_level_cm {
            return Err(invalid("thresholds.alert_level_cm must be below severe_level_cm"));
        }
        if t.moderate_velocity_cm_h >= t.panic_velocity_cm_h {
            return Err(invalid("thresholds.moderate_velocity_cm_h must be below panic_velocity_cm_h"));
        }
        if let Some(watch) = t.watch_level_cm {
            if !watch.is_finite() || watch <= 0.0 || watch >= t.alert_level_cm {
                return Err(invalid("thresholds.watch_level_cm must be positive and below alert_level_cm"));
            }
        }

        if let Some(hour) = self.routine.hours.iter().find(|h| **h >= 24) {
            return Err(invalid(format!("routine.hours contains {}, must be 0-23", hour)));
        }
        if self.routine.minute_cutoff >= 60 {
            return Err(invalid("routine.minute_cutoff must be 0-59"));
        }
        if !(0..=MAX_INTERVAL_MINUTES).contains(&self.routine.min_gap_minutes) {
            return Err(invalid(format!(
                "routine.min_gap_minutes must be between 0 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }

        let r = &self.reinterval;
        if [r.critical_minutes, r.warning_minutes, r.watch_minutes, r.routine_minutes]
            .iter()
            .any(|m| !(0..=MAX_INTERVAL_MINUTES).contains(m))
        {
            return Err(invalid(format!(
                "reinterval minutes must be between 0 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }

        let p = &self.polling;
        if !(1..=MAX_INTERVAL_MINUTES as u64).contains(&p.interval_minutes) {
            return Err(invalid(format!(
                "polling.interval_minutes must be between 1 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        if !(1..=120).contains(&p.fetch_timeout_secs) {
            return Err(invalid("polling.fetch_timeout_secs must be between 1 and 120"));
        }
        if !(2..=MAX_LOOKBACK_HOURS).contains(&p.lookback_hours) {
            return Err(invalid(format!(
                "polling.lookback_hours must be between 2 and {}",
                MAX_LOOKBACK_HOURS
            )));
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&p.stale_after_minutes) {
            return Err(invalid(format!(
                "polling.stale_after_minutes must be between 1 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        if !(1..=120).contains(&self.dispatch.webhook_timeout_secs) {
            return Err(invalid("dispatch.webhook_timeout_secs must be between 1 and 120"));
        }
        if !(-12..=14).contains(&p.utc_offset_hours) {
            return Err(invalid("polling.utc_offset_hours must be between -12 and 14"));
        }

        for (role, code) in [
            ("local", &self.stations.local),
            ("upstream_short", &self.stations.upstream_short),
            ("upstream_long", &self.stations.upstream_long),
        ] {
            if !stations::is_valid_code(code) {
                return Err(invalid(format!("stations.{} '{}' is not an 8-digit station code", role, code)));
            }
        }

        if self.state.stories_per_post == 0 {
            return Err(invalid("state.stories_per_post must be positive"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../floodwatch.toml");

    const MINIMAL: &str = r#"
        [thresholds]
        alert_level_cm = 600
        severe_level_cm = 760
        moderate_velocity_cm_h = 10
        panic_velocity_cm_h = 30
        upstream_critical_delta_cm = 40
        upstream_long_velocity_cm_h = 50
    "#;

    #[test]
    fn test_sample_config_loads() {
        let config = Config::from_toml_str(SAMPLE).expect("shipped config must be valid");
        assert_eq!(config.thresholds.alert_level_cm, 600.0);
        assert_eq!(config.thresholds.severe_level_cm, 760.0);
        assert_eq!(config.stations.local, "56696000");
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.routine.hours, vec![7, 19]);
        assert_eq!(config.routine.minute_cutoff, 25);
        assert_eq!(config.reinterval.critical_minutes, 15);
        assert_eq!(config.reinterval.warning_minutes, 30);
        assert_eq!(config.reinterval.routine_minutes, 720);
        assert_eq!(config.polling.interval_minutes, 15);
        assert_eq!(config.polling.utc_offset_hours, -3);
        assert_eq!(config.state.story_cap, 9);
        assert_eq!(config.stations.upstream_long, "56661000");
        assert!(config.thresholds.watch_level_cm.is_none());
        assert!(!config.archive.enabled);
    }

    #[test]
    fn test_missing_threshold_is_parse_error() {
        let text = MINIMAL.replace("panic_velocity_cm_h = 30", "");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {:?}", err);
    }

    #[test]
    fn test_missing_thresholds_table_is_parse_error() {
        let err = Config::from_toml_str("[polling]\ninterval_minutes = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_alert_above_severe_is_rejected() {
        let text = MINIMAL.replace("alert_level_cm = 600", "alert_level_cm = 800");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let text = MINIMAL.replace("upstream_critical_delta_cm = 40", "upstream_critical_delta_cm = -1");
        assert!(Config::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_bad_routine_hour_is_rejected() {
        let text = format!("{}\n[routine]\nhours = [7, 24]\n", MINIMAL);
        assert!(Config::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        for extra in [
            "[polling]\ninterval_minutes = 18446744073709551615\n",
            "[polling]\ninterval_minutes = 0\n",
            "[polling]\nlookback_hours = 9223372036854775807\n",
            "[polling]\nlookback_hours = 1\n",
            "[polling]\nstale_after_minutes = 9223372036854775807\n",
            "[reinterval]\ncritical_minutes = 9223372036854775807\n",
            "[routine]\nmin_gap_minutes = -1\n",
            "[dispatch]\nwebhook_timeout_secs = 0\n",
        ] {
            let text = format!("{}\n{}", MINIMAL, extra);
            match Config::from_toml_str(&text) {
                Err(ConfigError::Invalid(_)) | Err(ConfigError::Parse(_)) => {}
                other => panic!("accepted {:?}: {:?}", extra, other.map(|c| c.polling)),
            }
        }
    }

    #[test]
    fn test_largest_accepted_durations_load() {
        let text = format!(
            "{}\n[polling]\ninterval_minutes = {}\nlookback_hours = {}\nstale_after_minutes = {}\n",
            MINIMAL, MAX_INTERVAL_MINUTES, MAX_LOOKBACK_HOURS, MAX_INTERVAL_MINUTES
        );
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.polling.lookback_hours, MAX_LOOKBACK_HOURS);
    }

    #[test]
    fn test_bad_station_code_is_rejected() {
        let text = format!("{}\n[stations]\nlocal = \"abc\"\n", MINIMAL);
        assert!(Config::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_routine_window_contains_is_inclusive_of_cutoff() {
        let window = RoutineWindow::default();
        assert!(window.contains(7, 0));
        assert!(window.contains(19, 25));
        assert!(!window.contains(19, 26));
        assert!(!window.contains(8, 5));
    }

    #[test]
    fn test_reinterval_for_severity() {
        let policy = ReintervalPolicy::default();
        assert_eq!(policy.for_severity(Severity::Critical), 15);
        assert_eq!(policy.for_severity(Severity::Warning), 30);
        assert_eq!(policy.for_severity(Severity::Routine), 720);
    }

    #[test]
    fn test_utc_offset() {
        let polling = PollingConfig::default();
        assert_eq!(polling.utc_offset().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_webhook_min_severity_parses() {
        let text = format!("{}\n[dispatch]\nwebhook_min_severity = \"critical\"\n", MINIMAL);
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.dispatch.webhook_min_severity, Severity::Critical);
    }
}
