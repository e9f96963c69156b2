//! Incident impact lookup.
//!
//! Pure table keyed by incident type and severity. Independent of the
//! prediction pipeline and stateless.

use serde::{Deserialize, Serialize};

/// Additional wait, in minutes, that a multiplier of 1.0 corresponds to.
pub const BASE_ADDITIONAL_WAIT: f64 = 30.0;
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

const IMPACT_TABLE: [(&str, [f64; 3]); 4] = [
    ("car_accident", [1.2, 1.5, 2.0]),
    ("fire", [1.3, 1.8, 2.5]),
    ("medical_emergency", [1.1, 1.4, 1.8]),
    ("natural_disaster", [1.5, 2.0, 3.0]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentImpact {
    pub incident_type: String,
    pub severity: String,
    pub location: String,
    pub impact_multiplier: f64,
    pub estimated_additional_wait_minutes: u32,
    pub affected_hospitals: Vec<String>,
}

/// Multiplier for an incident; unknown type or severity yields 1.0.
pub fn impact_multiplier(incident_type: &str, severity: &str) -> f64 {
    let column = match severity {
        "low" => 0,
        "medium" => 1,
        "high" => 2,
        _ => return DEFAULT_MULTIPLIER,
    };
    IMPACT_TABLE
        .iter()
        .find(|(kind, _)| *kind == incident_type)
        .map(|(_, row)| row[column])
        .unwrap_or(DEFAULT_MULTIPLIER)
}

pub fn simulate_incident(incident_type: &str, location: &str, severity: &str) -> IncidentImpact {
    let multiplier = impact_multiplier(incident_type, severity);
    IncidentImpact {
        incident_type: incident_type.to_string(),
        severity: severity.to_string(),
        location: location.to_string(),
        impact_multiplier: multiplier,
        estimated_additional_wait_minutes: (BASE_ADDITIONAL_WAIT * multiplier) as u32,
        affected_hospitals: vec!["All nearby hospitals".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_high() {
        let impact = simulate_incident("fire", "loc", "high");
        assert_eq!(impact.impact_multiplier, 2.5);
        assert_eq!(impact.estimated_additional_wait_minutes, 75);
        assert_eq!(impact.location, "loc");
    }

    #[test]
    fn test_unknown_keys_default() {
        for (kind, severity) in [("meteor", "high"), ("fire", "moderate"), ("", "")] {
            let impact = simulate_incident(kind, "x", severity);
            assert_eq!(impact.impact_multiplier, 1.0);
            assert_eq!(impact.estimated_additional_wait_minutes, 30);
        }
    }

    #[test]
    fn test_table_range() {
        for (kind, _) in IMPACT_TABLE {
            for severity in ["low", "medium", "high"] {
                let m = impact_multiplier(kind, severity);
                assert!((1.0..=3.0).contains(&m));
            }
        }
        assert_eq!(simulate_incident("natural_disaster", "x", "high").estimated_additional_wait_minutes, 90);
    }
}
