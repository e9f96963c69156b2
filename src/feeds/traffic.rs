//! Time-of-day traffic simulation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use super::{GeoPoint, TrafficFeed};
use crate::engine::TrafficRecord;

pub const FREE_FLOW_SPEED: f64 = 65.0;

/// Level and average-speed band for a moment in the week.
pub fn traffic_pattern(at: NaiveDateTime) -> (&'static str, RangeInclusive<u32>) {
    let hour = at.hour();
    let (level, speeds) = if (7..=9).contains(&hour) || (17..=19).contains(&hour) {
        ("high", 15..=35)
    } else if (10..=16).contains(&hour) {
        ("medium", 25..=45)
    } else if hour >= 22 || hour <= 6 {
        ("low", 40..=65)
    } else {
        ("medium", 30..=50)
    };

    let weekend = at.weekday().num_days_from_monday() >= 5;
    let level = if weekend && level != "low" { "medium" } else { level };
    (level, speeds)
}

pub struct SimulatedTraffic {
    rng: Mutex<StdRng>,
}

impl SimulatedTraffic {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }

    pub fn sample(&self, at: NaiveDateTime) -> TrafficRecord {
        let (level, speeds) = traffic_pattern(at);
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let speed = f64::from(rng.gen_range(speeds));
        TrafficRecord {
            level: Some(level.to_string()),
            average_speed: Some(speed),
            congestion_level: Some((100.0 - (speed / FREE_FLOW_SPEED * 100.0).trunc()).max(0.0)),
            incidents: Some(rng.gen_range(0..=3)),
            source: Some("simulated".to_string()),
        }
    }
}

#[async_trait]
impl TrafficFeed for SimulatedTraffic {
    async fn current(&self, _location: GeoPoint, at: NaiveDateTime) -> Result<TrafficRecord> {
        Ok(self.sample(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        // March 2024: the 4th is a Monday, the 9th a Saturday.
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    #[test]
    fn test_weekday_patterns() {
        assert_eq!(traffic_pattern(at(4, 8)).0, "high");
        assert_eq!(traffic_pattern(at(4, 13)).0, "medium");
        assert_eq!(traffic_pattern(at(4, 23)).0, "low");
        assert_eq!(traffic_pattern(at(4, 20)).0, "medium");
    }

    #[test]
    fn test_weekend_caps_rush_hour() {
        assert_eq!(traffic_pattern(at(9, 8)).0, "medium");
        assert_eq!(traffic_pattern(at(9, 2)).0, "low");
    }

    #[test]
    fn test_sample_is_flagged_and_bounded() {
        let traffic = SimulatedTraffic::new(Some(3));
        for _ in 0..20 {
            let record = traffic.sample(at(4, 18));
            let speed = record.average_speed.unwrap();
            assert!((15.0..=35.0).contains(&speed));
            assert!(record.incidents.unwrap() <= 3);
            assert_eq!(record.source.as_deref(), Some("simulated"));
        }
    }
}
