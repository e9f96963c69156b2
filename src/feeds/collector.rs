//! Data collector
//!
//! Gathers one snapshot of the world for a location: nearby hospitals with a
//! current wait and capacity reading, plus the shared weather and traffic
//! records. Live wait times are not available to us, so they are simulated
//! from the hour of day; the capacity figure comes from a hospital-size
//! heuristic. Feed failures degrade to fallback records and never abort.

use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::hospitals::{HospitalDirectory, RankedHospital};
use super::{GeoPoint, TrafficFeed, WeatherFeed};
use crate::engine::{HospitalState, TrafficRecord, WeatherRecord};

const LARGE_HOSPITAL_KEYWORDS: [&str; 4] = ["medical center", "university", "regional", "trauma"];
const MEDIUM_HOSPITAL_KEYWORDS: [&str; 3] = ["general", "memorial", "community"];

fn is_peak_hour(hour: u32) -> bool {
    (8..=10).contains(&hour) || (18..=20).contains(&hour)
}

/// Expected utilization for a hospital of this kind at this time, plus `jitter`.
pub fn capacity_utilization(name: &str, at: NaiveDateTime, jitter: f64) -> f64 {
    let name = name.to_lowercase();
    let base = if LARGE_HOSPITAL_KEYWORDS.iter().any(|k| name.contains(k)) {
        0.75
    } else if MEDIUM_HOSPITAL_KEYWORDS.iter().any(|k| name.contains(k)) {
        0.65
    } else {
        0.55
    };

    let hour = at.hour();
    let mut time_multiplier = if is_peak_hour(hour) {
        1.2
    } else if hour >= 22 || hour <= 6 {
        0.6
    } else {
        1.0
    };
    if at.weekday().num_days_from_monday() >= 5 {
        time_multiplier *= 0.9;
    }

    (base * time_multiplier + jitter).clamp(0.1, 0.95)
}

/// Simulated wait in minutes from a base draw and a variation draw.
pub fn simulated_wait(at: NaiveDateTime, base: u32, variation: i32) -> i64 {
    let hour = at.hour();
    let mut wait = f64::from(base);
    if (2..=6).contains(&hour) {
        wait *= 0.7;
    } else if is_peak_hour(hour) {
        wait *= 1.5;
    }
    ((wait + f64::from(variation)).trunc() as i64).max(5)
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectedSnapshot {
    pub location: GeoPoint,
    pub hospitals: Vec<RankedHospital>,
    pub states: Vec<HospitalState>,
    pub weather: WeatherRecord,
    pub traffic: TrafficRecord,
}

pub struct DataCollector {
    directory: Arc<dyn HospitalDirectory>,
    weather: Arc<dyn WeatherFeed>,
    traffic: Arc<dyn TrafficFeed>,
    rng: Mutex<StdRng>,
}

impl DataCollector {
    pub fn new(
        directory: Arc<dyn HospitalDirectory>,
        weather: Arc<dyn WeatherFeed>,
        traffic: Arc<dyn TrafficFeed>,
    ) -> Self {
        Self {
            directory,
            weather,
            traffic,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub async fn weather_for(&self, location: GeoPoint) -> WeatherRecord {
        match self.weather.current(location).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Weather feed unavailable, using fallback record: {:#}", e);
                WeatherRecord::fallback()
            }
        }
    }

    /// An empty record lets the context builder apply its own defaults.
    pub async fn traffic_for(&self, location: GeoPoint, at: NaiveDateTime) -> TrafficRecord {
        match self.traffic.current(location, at).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Traffic feed unavailable: {:#}", e);
                TrafficRecord {
                    source: Some("fallback".to_string()),
                    ..Default::default()
                }
            }
        }
    }

    pub fn hospital_states(&self, hospitals: &[RankedHospital], at: NaiveDateTime) -> Vec<HospitalState> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        hospitals
            .iter()
            .map(|h| {
                let wait = simulated_wait(at, rng.gen_range(20..=60), rng.gen_range(-10..=20));
                let capacity = capacity_utilization(&h.record.name, at, rng.gen_range(-0.1..=0.1));
                info!(
                    "Collected data for {}: {} min wait, {:.0}% capacity",
                    h.record.name,
                    wait,
                    capacity * 100.0
                );
                HospitalState::new(h.record.id.clone(), h.record.name.clone())
                    .with_wait(wait)
                    .with_capacity(capacity)
            })
            .collect()
    }

    pub async fn snapshot(&self, location: GeoPoint, radius_miles: f64, at: NaiveDateTime) -> CollectedSnapshot {
        let hospitals = self.directory.nearby(location, radius_miles);
        let states = self.hospital_states(&hospitals, at);
        let weather = self.weather_for(location).await;
        let traffic = self.traffic_for(location, at).await;
        CollectedSnapshot {
            location,
            hospitals,
            states,
            weather,
            traffic,
        }
    }
}
