//! Street flood risk for the neighbourhood along the local gauge.
//!
//! Each segment has the river level (at the local station) at which it goes
//! under water. The list order is the order residents read it in and is
//! reported as-is, never sorted.

use serde::Serialize;

/// A stretch of street and the local river level that floods it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetSegment {
    pub name: &'static str,
    /// Which part of the street, usually a range of house numbers.
    pub stretch: &'static str,
    pub flood_level_cm: f64,
}

const fn segment(name: &'static str, stretch: &'static str, flood_level_cm: f64) -> StreetSegment {
    StreetSegment {
        name,
        stretch,
        flood_level_cm,
    }
}

pub const STREETS: &[StreetSegment] = &[
    segment("Rua Rio Corrente", "Toda a extensão", 563.0),
    segment("Rua Rio Tietê / Araguaia", "Toda a extensão", 590.0),
    segment("Rua Tamoios", "Base (Acesso ao Rio)", 651.0),
    segment("Rua Tamoios", "Nº 1 (Esq. J. Pedreiro)", 810.0),
    segment("Rua João Pedreiro", "Nº 21 ao 651", 760.0),
    segment("Rua João Pedreiro", "Nº 673 ao 715", 890.0),
    segment("Rua João Pedreiro", "Nº 721 ao 1001", 910.0),
    segment("Rua Guanabara", "Nº 51 ao 133", 835.0),
    segment("Rua Guanabara", "Nº 197 ao 264", 865.0),
    segment("Rua Guanabara", "Nº 513 (Final)", 920.0),
    segment("Rua Minas Gerais", "Nº 188 ao 400", 860.0),
    segment("Rua Minas Gerais", "Nº 440 ao Final", 900.0),
    segment("Travessa Bartolomeu", "Toda a extensão", 718.0),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreetRisk {
    pub name: String,
    pub stretch: String,
    pub flood_level_cm: f64,
    /// Share of the flood level already reached, capped at 100, one decimal.
    pub percentage: f64,
    pub flooded: bool,
}

/// Risk of every registered segment at the given local level.
pub fn street_risk(level_cm: f64) -> Vec<StreetRisk> {
    street_risk_for(STREETS, level_cm)
}

pub fn street_risk_for(segments: &[StreetSegment], level_cm: f64) -> Vec<StreetRisk> {
    segments
        .iter()
        .map(|s| {
            let percentage = (level_cm / s.flood_level_cm * 100.0).min(100.0);
            StreetRisk {
                name: s.name.to_string(),
                stretch: s.stretch.to_string(),
                flood_level_cm: s.flood_level_cm,
                percentage: (percentage * 10.0).round() / 10.0,
                flooded: level_cm >= s.flood_level_cm,
            }
        })
        .collect()
}

/// Number of segments under water at the given level.
pub fn flooded_count(level_cm: f64) -> usize {
    STREETS.iter().filter(|s| level_cm >= s.flood_level_cm).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_preserved() {
        let report = street_risk(500.0);
        assert_eq!(report.len(), STREETS.len());
        assert_eq!(report[0].name, "Rua Rio Corrente");
        assert_eq!(report[12].name, "Travessa Bartolomeu");
        // Not sorted by elevation: 810 comes before 760.
        assert_eq!(report[3].flood_level_cm, 810.0);
        assert_eq!(report[4].flood_level_cm, 760.0);
    }

    #[test]
    fn test_percentage_rounded_to_one_decimal() {
        let report = street_risk(500.0);
        // 500 / 563 = 88.809...
        assert_eq!(report[0].percentage, 88.8);
        assert!(!report[0].flooded);
    }

    #[test]
    fn test_percentage_capped_and_flooded_at_elevation() {
        let report = street_risk(563.0);
        assert_eq!(report[0].percentage, 100.0);
        assert!(report[0].flooded);

        let report = street_risk(1000.0);
        assert!(report.iter().all(|r| r.percentage == 100.0 && r.flooded));
    }

    #[test]
    fn test_flooded_count() {
        assert_eq!(flooded_count(400.0), 0);
        assert_eq!(flooded_count(600.0), 2);
        assert_eq!(flooded_count(760.0), 5);
    }
}
