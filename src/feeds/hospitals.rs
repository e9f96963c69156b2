//! Hospital directory: a fixed list ranked by great-circle distance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::GeoPoint;

const EARTH_RADIUS_MILES: f64 = 3958.8;
pub const DEFAULT_RADIUS_MILES: f64 = 25.0;
pub const DEFAULT_LOCATION: GeoPoint = GeoPoint { lat: 40.7128, lng: -74.0060 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    pub id: String,
    pub name: String,
    pub coordinates: GeoPoint,
    #[serde(default)]
    pub address: Option<String>,
    /// Licensed ER beds.
    #[serde(default = "default_beds")]
    pub capacity: u32,
}

fn default_beds() -> u32 {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHospital {
    #[serde(flatten)]
    pub record: HospitalRecord,
    pub distance_miles: f64,
}

pub trait HospitalDirectory: Send + Sync {
    /// Hospitals within `radius_miles` of `center`, nearest first.
    fn nearby(&self, center: GeoPoint, radius_miles: f64) -> Vec<RankedHospital>;
}

pub fn haversine_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: Vec<HospitalRecord>,
}

impl StaticDirectory {
    /// Rejects empty and duplicate ids up front, so a batch never has to.
    pub fn new(records: Vec<HospitalRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for record in &records {
            anyhow::ensure!(!record.id.trim().is_empty(), "hospital '{}' has an empty id", record.name);
            anyhow::ensure!(seen.insert(record.id.clone()), "duplicate hospital id '{}'", record.id);
        }
        Ok(Self { records })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<HospitalRecord> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded {} hospitals from {}", records.len(), path.display());
        Self::new(records)
    }

    /// A handful of Manhattan hospitals around the default location.
    pub fn sample() -> Self {
        let record = |id: &str, name: &str, lat: f64, lng: f64, capacity: u32| HospitalRecord {
            id: id.to_string(),
            name: name.to_string(),
            coordinates: GeoPoint::new(lat, lng),
            address: None,
            capacity,
        };
        Self {
            records: vec![
                record("bellevue", "Bellevue Hospital Center", 40.7392, -73.9754, 80),
                record("nyu_langone", "NYU Langone Medical Center", 40.7421, -73.9739, 70),
                record("lenox_hill", "Lenox Hill Hospital", 40.7737, -73.9603, 45),
                record("ny_presbyterian", "NewYork-Presbyterian Lower Manhattan Hospital", 40.7105, -74.0050, 40),
                record("mount_sinai", "Mount Sinai Hospital", 40.7900, -73.9526, 90),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HospitalDirectory for StaticDirectory {
    fn nearby(&self, center: GeoPoint, radius_miles: f64) -> Vec<RankedHospital> {
        let mut ranked: Vec<RankedHospital> = self
            .records
            .iter()
            .map(|record| RankedHospital {
                distance_miles: haversine_miles(center, record.coordinates),
                record: record.clone(),
            })
            .filter(|h| h.distance_miles <= radius_miles)
            .collect();
        ranked.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_haversine_known_distance() {
        // Manhattan to downtown Philadelphia is roughly 80 miles.
        let d = haversine_miles(DEFAULT_LOCATION, GeoPoint::new(39.9526, -75.1652));
        assert!((d - 80.6).abs() < 1.5, "got {}", d);
        assert_eq!(haversine_miles(DEFAULT_LOCATION, DEFAULT_LOCATION), 0.0);
    }

    #[test]
    fn test_nearby_is_sorted_and_filtered() {
        let dir = StaticDirectory::sample();
        let ranked = dir.nearby(DEFAULT_LOCATION, DEFAULT_RADIUS_MILES);
        assert_eq!(ranked.len(), dir.len());
        assert_eq!(ranked[0].record.id, "ny_presbyterian");
        assert!(ranked.windows(2).all(|w| w[0].distance_miles <= w[1].distance_miles));

        assert!(dir.nearby(GeoPoint::new(34.05, -118.24), DEFAULT_RADIUS_MILES).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "name": "Alpha General", "coordinates": {{"lat": 1.0, "lng": 2.0}}}}]"#
        )
        .unwrap();
        let dir = StaticDirectory::from_json_file(file.path()).unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.nearby(GeoPoint::new(1.0, 2.0), 1.0)[0].record.capacity, 50);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let rec = HospitalRecord {
            id: "x".into(),
            name: "X".into(),
            coordinates: GeoPoint::new(0.0, 0.0),
            address: None,
            capacity: 10,
        };
        assert!(StaticDirectory::new(vec![rec.clone(), rec]).is_err());
    }
}
