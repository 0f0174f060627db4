//! ANA (Agência Nacional de Águas) telemetry client.
//!
//! Retrieves water level (and discharge, when reported) from the
//! `DadosHidrometeorologicos` operation of the ANA telemetry web service.
//! The service answers in XML; each sample is a `<DadosHidrometereologicos>`
//! element (note the service's own spelling) with station-local timestamps:
//!
//! ```xml
//! <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos1">
//!   <CodEstacao>56696000</CodEstacao>
//!   <DataHora>2026-01-10 12:15:00</DataHora>
//!   <Vazao />
//!   <Nivel>512.00</Nivel>
//!   <Chuva>0.00</Chuva>
//! </DadosHidrometereologicos>
//! ```
//!
//! API: http://telemetriaws1.ana.gov.br/ServiceANA.asmx

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::TelemetrySource;
use crate::config::Config;
use crate::logging::log_telemetry_failure;
use crate::model::{sort_newest_first, Reading, TelemetryError};

const ROW_TAG: &[u8] = b"DadosHidrometereologicos";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const QUERY_DATE_FORMAT: &str = "%d/%m/%Y";

// ============================================================================
// Client
// ============================================================================

pub struct AnaClient {
    http: reqwest::blocking::Client,
    base_url: String,
    offset: FixedOffset,
}

impl AnaClient {
    pub fn new(base_url: &str, timeout: Duration, offset: FixedOffset) -> Result<Self, TelemetryError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            offset,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TelemetryError> {
        Self::new(
            &config.telemetry.base_url,
            Duration::from_secs(config.polling.fetch_timeout_secs),
            config.polling.utc_offset(),
        )
    }

    /// Fetch readings for one station, surfacing every failure.
    ///
    /// An answer that parses but yields no reading inside the window is
    /// `TelemetryError::NoData`.
    pub fn try_fetch(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, TelemetryError> {
        let params = query_params(station_id, from, to, self.offset);
        debug!(station = station_id, url = %self.base_url, ?params, "requesting ANA telemetry");

        let response = self.http.get(&self.base_url).query(&params).send()?;
        if !response.status().is_success() {
            return Err(TelemetryError::HttpStatus(response.status().as_u16()));
        }
        let body = response.text()?;

        let mut readings: Vec<Reading> = parse_response(&body, station_id, self.offset)?
            .into_iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .collect();
        if readings.is_empty() {
            return Err(TelemetryError::NoData(station_id.to_string()));
        }
        sort_newest_first(&mut readings);

        debug!(station = station_id, count = readings.len(), "ANA telemetry parsed");
        Ok(readings)
    }
}

impl TelemetrySource for AnaClient {
    fn fetch(&self, station_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Reading> {
        match self.try_fetch(station_id, from, to) {
            Ok(readings) => readings,
            Err(e) => {
                log_telemetry_failure(station_id, "ANA fetch", &e);
                Vec::new()
            }
        }
    }
}

/// Query string for a fetch. The service filters by whole local days, so the
/// window is widened to the days containing `from` and `to`.
pub fn query_params(
    station_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    offset: FixedOffset,
) -> [(&'static str, String); 3] {
    [
        ("codEstacao", station_id.to_string()),
        (
            "dataInicio",
            from.with_timezone(&offset).format(QUERY_DATE_FORMAT).to_string(),
        ),
        (
            "dataFim",
            to.with_timezone(&offset).format(QUERY_DATE_FORMAT).to_string(),
        ),
    ]
}

// ============================================================================
// XML parsing
// ============================================================================

#[derive(Clone, Copy)]
enum Field {
    DataHora,
    Nivel,
    Vazao,
}

#[derive(Default)]
struct RawRow {
    data_hora: Option<String>,
    nivel: Option<String>,
    vazao: Option<String>,
}

impl RawRow {
    fn set(&mut self, field: Field, text: String) {
        match field {
            Field::DataHora => self.data_hora = Some(text),
            Field::Nivel => self.nivel = Some(text),
            Field::Vazao => self.vazao = Some(text),
        }
    }

    /// Rows without a usable timestamp or level are dropped; the service
    /// routinely emits blank `<Nivel>` for samples the gauge missed.
    fn into_reading(self, station_id: &str, offset: FixedOffset) -> Option<Reading> {
        let naive = NaiveDateTime::parse_from_str(self.data_hora?.trim(), DATE_FORMAT).ok()?;
        let timestamp = offset.from_local_datetime(&naive).single()?.with_timezone(&Utc);
        let level_cm = parse_number(self.nivel.as_deref()?)?;
        let flow_m3s = self.vazao.as_deref().and_then(parse_number);
        Some(Reading {
            station_id: station_id.to_string(),
            timestamp,
            level_cm,
            flow_m3s,
        })
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a `DadosHidrometeorologicos` response body into readings, in
/// document order. Malformed XML is a `Parse` error; malformed rows are
/// skipped.
pub fn parse_response(
    xml: &str,
    station_id: &str,
    offset: FixedOffset,
) -> Result<Vec<Reading>, TelemetryError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut readings = Vec::new();
    let mut row: Option<RawRow> = None;
    let mut field: Option<Field> = None;
    let mut skipped = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            TelemetryError::Parse(format!("XML error at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == ROW_TAG {
                    row = Some(RawRow::default());
                } else if row.is_some() {
                    field = match name.as_ref() {
                        b"DataHora" => Some(Field::DataHora),
                        b"Nivel" => Some(Field::Nivel),
                        b"Vazao" => Some(Field::Vazao),
                        _ => None,
                    };
                }
            }
            Event::Text(t) => {
                if let (Some(current), Some(f)) = (row.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| TelemetryError::Parse(e.to_string()))?;
                    current.set(f, text.into_owned());
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == ROW_TAG {
                    if let Some(raw) = row.take() {
                        match raw.into_reading(station_id, offset) {
                            Some(reading) => readings.push(reading),
                            None => skipped += 1,
                        }
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if skipped > 0 {
        debug!(station = station_id, skipped, "skipped incomplete ANA rows");
    }
    Ok(readings)
}

// ============================================================================
// Tests
// ============================================================================
