//! Station Verification Module
//!
//! Checks every configured station against the live ANA service and reports
//! whether it answers with recent data. Run it after changing station codes,
//! or whenever the monitor keeps logging "no local data".

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::ingest::AnaClient;
use crate::model::{StationRole, TelemetryError};
use crate::stations;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<StationVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub stale: usize,
    pub failed: usize,
}

impl VerificationSummary {
    pub fn from_results(results: &[StationVerification]) -> Self {
        let count = |status: VerificationStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            working: count(VerificationStatus::Success),
            stale: count(VerificationStatus::Stale),
            failed: count(VerificationStatus::Failed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StationVerification {
    pub code: String,
    pub name: String,
    pub role: StationRole,
    pub status: VerificationStatus,
    pub sample_data_count: usize,
    pub newest_age_minutes: Option<i64>,
    pub reports_flow: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    /// Answers, but the newest reading is older than the staleness limit.
    Stale,
    Failed,
}

// ============================================================================
// Station check
// ============================================================================

pub fn verify_station(
    client: &AnaClient,
    code: &str,
    role: StationRole,
    lookback: Duration,
    stale_after_minutes: i64,
    now: DateTime<Utc>,
) -> StationVerification {
    let mut result = StationVerification {
        code: code.to_string(),
        name: stations::display_name(code),
        role,
        status: VerificationStatus::Failed,
        sample_data_count: 0,
        newest_age_minutes: None,
        reports_flow: false,
        error_message: None,
    };

    if !stations::is_valid_code(code) {
        result.error_message = Some("station codes are 8 digits".to_string());
        return result;
    }

    match client.try_fetch(code, now - lookback, now) {
        Ok(readings) => {
            result.sample_data_count = readings.len();
            result.reports_flow = readings.iter().any(|r| r.flow_m3s.is_some());
            let age = readings.first().map(|r| (now - r.timestamp).num_minutes());
            result.newest_age_minutes = age;
            result.status = match age {
                Some(age) if age <= stale_after_minutes => VerificationStatus::Success,
                _ => VerificationStatus::Stale,
            };
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
        }
    }

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

/// Check every configured station. Prints nothing, so the report can go out
/// as JSON untouched.
pub fn run_verification(config: &Config, now: DateTime<Utc>) -> Result<VerificationReport, TelemetryError> {
    let client = AnaClient::from_config(config)?;
    let lookback = Duration::hours(config.polling.lookback_hours);
    let configured = [
        (&config.stations.local, StationRole::Local),
        (&config.stations.upstream_short, StationRole::UpstreamShortHorizon),
        (&config.stations.upstream_long, StationRole::UpstreamLongHorizon),
    ];

    let results: Vec<StationVerification> = configured
        .into_iter()
        .map(|(code, role)| verify_station(&client, code, role, lookback, config.polling.stale_after_minutes, now))
        .collect();

    Ok(VerificationReport {
        timestamp: now.to_rfc3339(),
        summary: VerificationSummary::from_results(&results),
        results,
    })
}

fn status_text(result: &StationVerification) -> String {
    match result.status {
        VerificationStatus::Success => format!("OK ({} readings)", result.sample_data_count),
        VerificationStatus::Stale => format!(
            "STALE (newest is {} min old)",
            result.newest_age_minutes.unwrap_or_default()
        ),
        VerificationStatus::Failed => format!(
            "FAILED: {}",
            result.error_message.as_deref().unwrap_or("Unknown")
        ),
    }
}

/// Human-readable report: one line per station, then the totals.
pub fn summary_text(report: &VerificationReport) -> String {
    let mut lines = vec![format!("VERIFICATION SUMMARY ({})", report.timestamp)];
    for result in &report.results {
        lines.push(format!(
            "  {} {} ({}) ... {}",
            result.code,
            result.name,
            result.role,
            status_text(result)
        ));
    }
    let s = &report.summary;
    lines.push(String::new());
    lines.push(format!("  Working: {}/{}", s.working, s.total));
    lines.push(format!("  Stale:   {}", s.stale));
    lines.push(format!("  Failed:  {}", s.failed));
    lines.join("\n")
}

pub fn print_summary(report: &VerificationReport) {
    println!("{}", summary_text(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    fn result(code: &str, status: VerificationStatus) -> StationVerification {
        StationVerification {
            code: code.to_string(),
            name: stations::display_name(code),
            role: StationRole::Local,
            status,
            sample_data_count: 0,
            newest_age_minutes: None,
            reports_flow: false,
            error_message: None,
        }
    }

    #[test]
    fn test_summary_counts_each_status() {
        let results = vec![
            result("56696000", VerificationStatus::Success),
            result("56688080", VerificationStatus::Stale),
            result("56661000", VerificationStatus::Failed),
        ];
        let summary = VerificationSummary::from_results(&results);
        assert_eq!(
            summary,
            VerificationSummary {
                total: 3,
                working: 1,
                stale: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_unreachable_service_report_is_pure_json() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let toml = format!(
            r#"
            [thresholds]
            alert_level_cm = 600
            severe_level_cm = 760
            moderate_velocity_cm_h = 10
            panic_velocity_cm_h = 30
            upstream_critical_delta_cm = 40
            upstream_long_velocity_cm_h = 50

            [telemetry]
            base_url = "http://127.0.0.1:{}/x"

            [polling]
            fetch_timeout_secs = 2
            "#,
            port
        );
        let config = Config::from_toml_str(&toml).unwrap();

        let report = run_verification(&config, Utc::now()).unwrap();
        assert_eq!(report.summary.failed, 3);

        let json = serde_json::to_string_pretty(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["summary"]["total"], 3);
        assert_eq!(parsed["results"][0]["status"], "Failed");

        let text = summary_text(&report);
        assert!(text.contains("56696000"));
        assert!(text.contains("FAILED"));
        assert!(text.ends_with("Failed:  3"));
    }

    #[test]
    fn test_invalid_code_fails_without_request() {
        let client = AnaClient::new(
            "http://127.0.0.1:9/unused",
            std::time::Duration::from_secs(1),
            Utc.fix(),
        )
        .unwrap();
        let now = Utc::now();
        let result = verify_station(&client, "ABC", StationRole::Local, Duration::hours(24), 180, now);
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(result.error_message.unwrap().contains("8 digits"));
    }
}
