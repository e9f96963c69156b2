//! Prediction & fallback engine
//!
//! `PredictionEngine` is the entry point: it gathers the auxiliary feeds,
//! runs one batch over the supplied hospitals and exposes the incident and
//! symptom helpers alongside.

pub mod batch;
pub mod context;
pub mod error;
pub mod fallback;
pub mod incident;
pub mod model;
pub mod prediction;
pub mod rules;
pub mod symptoms;

use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

use crate::feeds::{collect_auxiliary, ContextFeed};

pub use batch::{BatchDriver, BatchResult, DEFAULT_MAX_CONCURRENCY};
pub use context::{
    AuxiliaryFeeds, HospitalState, OpaquePayload, SignalContext, TrafficLevel, TrafficRecord, WeatherCondition,
    WeatherRecord,
};
pub use error::{BatchAbort, EstimationFailure, RuleFault};
pub use fallback::{FallbackOrchestrator, FallbackStats, StrategyStatus};
pub use incident::{simulate_incident, IncidentImpact};
pub use model::ModelBackedEstimator;
pub use prediction::{Advice, EstimationMethod, Prediction};
pub use rules::RuleBasedEstimator;
pub use symptoms::{SymptomAdvice, Urgency};

pub struct PredictionEngine {
    driver: BatchDriver,
    feeds: Vec<Arc<dyn ContextFeed>>,
}

impl PredictionEngine {
    pub fn new(orchestrator: FallbackOrchestrator) -> Self {
        Self {
            driver: BatchDriver::new(Arc::new(orchestrator)),
            feeds: Vec::new(),
        }
    }

    pub fn with_feeds(mut self, feeds: Vec<Arc<dyn ContextFeed>>) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        self.driver = self.driver.with_max_concurrency(permits);
        self
    }

    /// One prediction per hospital at the current local time.
    pub async fn generate_predictions(
        &self,
        weather: &WeatherRecord,
        traffic: &TrafficRecord,
        hospitals: &[HospitalState],
    ) -> Result<BatchResult, BatchAbort> {
        self.generate_predictions_at(weather, traffic, hospitals, Local::now().naive_local())
            .await
    }

    /// Same as `generate_predictions` with an explicit clock reading.
    pub async fn generate_predictions_at(
        &self,
        weather: &WeatherRecord,
        traffic: &TrafficRecord,
        hospitals: &[HospitalState],
        at: NaiveDateTime,
    ) -> Result<BatchResult, BatchAbort> {
        let auxiliary = collect_auxiliary(&self.feeds, at).await;
        self.driver.run(hospitals, weather, traffic, &auxiliary, at).await
    }

    pub fn simulate_incident(&self, incident_type: &str, location: &str, severity: &str) -> IncidentImpact {
        simulate_incident(incident_type, location, severity)
    }

    pub async fn analyze_symptoms(&self, symptoms: &str, severity: &str) -> SymptomAdvice {
        symptoms::analyze_symptoms(self.orchestrator().model(), symptoms, severity).await
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        self.driver.orchestrator()
    }

    pub fn status(&self) -> StrategyStatus {
        self.orchestrator().status()
    }

    pub fn stats(&self) -> FallbackStats {
        self.orchestrator().stats()
    }
}
