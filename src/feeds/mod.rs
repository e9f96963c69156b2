//! Collaborator feeds
//!
//! Everything the engine consumes but does not own: weather, traffic, the
//! auxiliary context feeds and the hospital directory. Each sits behind a
//! trait so tests can inject deterministic fixtures.

pub mod collector;
pub mod hospitals;
pub mod simulated;
pub mod traffic;
pub mod weather;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::engine::{AuxiliaryFeeds, OpaquePayload, TrafficRecord, WeatherRecord};

pub use collector::{CollectedSnapshot, DataCollector};
pub use hospitals::{HospitalDirectory, HospitalRecord, RankedHospital, StaticDirectory};
pub use simulated::{simulated_feeds, SimulatedFeed, SimulatedKind};
pub use traffic::SimulatedTraffic;
pub use weather::OpenMeteoWeather;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[async_trait]
pub trait WeatherFeed: Send + Sync {
    async fn current(&self, location: GeoPoint) -> Result<WeatherRecord>;
}

#[async_trait]
pub trait TrafficFeed: Send + Sync {
    async fn current(&self, location: GeoPoint, at: NaiveDateTime) -> Result<TrafficRecord>;
}

/// A source of extra prompt context. Its record is forwarded, never inspected.
#[async_trait]
pub trait ContextFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, at: NaiveDateTime) -> Result<OpaquePayload>;
}

/// Query every feed; a failing feed contributes "Not available" instead of blocking.
pub async fn collect_auxiliary(feeds: &[Arc<dyn ContextFeed>], at: NaiveDateTime) -> AuxiliaryFeeds {
    let mut auxiliary = AuxiliaryFeeds::new();
    for feed in feeds {
        let payload = match feed.collect(at).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Context feed {} unavailable: {}", feed.name(), e);
                OpaquePayload::text("Not available")
            }
        };
        auxiliary.insert(feed.name().to_string(), payload);
    }
    auxiliary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct Broken;

    #[async_trait]
    impl ContextFeed for Broken {
        fn name(&self) -> &str {
            "health_alerts"
        }

        async fn collect(&self, _at: NaiveDateTime) -> Result<OpaquePayload> {
            anyhow::bail!("upstream 503")
        }
    }

    #[tokio::test]
    async fn test_failed_feed_is_not_available() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let feeds: Vec<Arc<dyn ContextFeed>> = vec![Arc::new(Broken)];
        let aux = collect_auxiliary(&feeds, at).await;
        assert_eq!(aux["health_alerts"], OpaquePayload::text("Not available"));
    }
}
