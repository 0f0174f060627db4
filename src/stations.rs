//! Station registry for the Piracicaba river monitoring service.
//!
//! Defines the ANA telemetry stations the service knows about, along with
//! their role in the decision and their approximate lead time relative to the
//! local gauge. The station ids actually polled come from configuration
//! (`config::StationsConfig`); this registry supplies the defaults and the
//! human-readable metadata used in logs and the `verify` command.

use crate::model::StationRole;

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single ANA telemetry station.
pub struct StationInfo {
    /// 8-digit ANA station code.
    pub code: &'static str,
    /// Station name as published by ANA.
    pub name: &'static str,
    /// What the station tells us about the flood risk.
    pub description: &'static str,
    pub role: StationRole,
    /// Typical delay before a change here shows up at the local gauge.
    pub lead_time_hours: u32,
}

/// Default stations, ordered from the local gauge to the headwaters.
pub static STATION_REGISTRY: &[StationInfo] = &[
    StationInfo {
        code: "56696000",
        name: "Timóteo",
        description: "Local reference gauge for the Cachoeira do Vale \
                      neighborhood. Street flood elevations are measured \
                      against this station.",
        role: StationRole::Local,
        lead_time_hours: 0,
    },
    StationInfo {
        code: "56688080",
        name: "Antônio Dias (Sá Carvalho dam)",
        description: "Just below the hydroelectric dam. A sudden jump between \
                      consecutive readings indicates floodgates opening.",
        role: StationRole::UpstreamShortHorizon,
        lead_time_hours: 2,
    },
    StationInfo {
        code: "56661000",
        name: "Nova Era",
        description: "Headwaters station. A sustained rise here is a flood \
                      wave that reaches the local gauge several hours later.",
        role: StationRole::UpstreamLongHorizon,
        lead_time_hours: 8,
    },
];

/// Looks up a station by code. Returns `None` if not found.
pub fn find_station(code: &str) -> Option<&'static StationInfo> {
    STATION_REGISTRY.iter().find(|s| s.code == code)
}

/// Default station code for a role.
pub fn default_code(role: StationRole) -> &'static str {
    STATION_REGISTRY
        .iter()
        .find(|s| s.role == role)
        .map(|s| s.code)
        .unwrap_or("")
}

/// Display name for a station code, falling back to the code itself.
pub fn display_name(code: &str) -> String {
    match find_station(code) {
        Some(info) => format!("{} ({})", info.name, code),
        None => code.to_string(),
    }
}

/// True if `code` has the shape of an ANA station code.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 8 && code.chars().all(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
