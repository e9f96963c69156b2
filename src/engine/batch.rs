//! Batch Driver
//!
//! Runs the context builder and orchestrator once per hospital. Hospitals are
//! independent, so they run concurrently up to a permit limit. Any
//! unrecovered error aborts the whole batch; partial batches are never returned.

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use super::context::{AuxiliaryFeeds, HospitalState, SignalContext, TrafficRecord, WeatherRecord};
use super::error::BatchAbort;
use super::fallback::FallbackOrchestrator;
use super::prediction::{EstimationMethod, Prediction};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Every prediction from one cycle, keyed by hospital id.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub predictions: BTreeMap<String, Prediction>,
}

impl BatchResult {
    pub fn empty() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            predictions: BTreeMap::new(),
        }
    }

    pub fn get(&self, hospital_id: &str) -> Option<&Prediction> {
        self.predictions.get(hospital_id)
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn count_by_method(&self, method: EstimationMethod) -> usize {
        self.predictions.values().filter(|p| p.method == method).count()
    }
}

pub struct BatchDriver {
    orchestrator: Arc<FallbackOrchestrator>,
    concurrency_limit: Arc<Semaphore>,
}

impl BatchDriver {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>) -> Self {
        Self {
            orchestrator,
            concurrency_limit: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
        }
    }

    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        self.concurrency_limit = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    pub async fn run(
        &self,
        hospitals: &[HospitalState],
        weather: &WeatherRecord,
        traffic: &TrafficRecord,
        auxiliary: &AuxiliaryFeeds,
        at: NaiveDateTime,
    ) -> Result<BatchResult, BatchAbort> {
        Self::check_ids(hospitals)?;

        let tasks = hospitals.iter().map(|hospital| {
            let semaphore = self.concurrency_limit.clone();
            let orchestrator = self.orchestrator.clone();
            async move {
                let _permit = semaphore.acquire().await.ok();
                let ctx = SignalContext::build(hospital, weather, traffic, auxiliary, at);
                orchestrator.predict(&ctx).await
            }
        });

        let mut predictions = BTreeMap::new();
        for result in join_all(tasks).await {
            match result {
                Ok(prediction) => {
                    predictions.insert(prediction.hospital_id.clone(), prediction);
                }
                Err(e) => {
                    error!("Prediction batch aborted: {}", e);
                    return Err(e);
                }
            }
        }

        let batch = BatchResult {
            batch_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            predictions,
        };
        info!(
            "Generated predictions for {} hospitals ({} model-backed, {} rule-based)",
            batch.len(),
            batch.count_by_method(EstimationMethod::ModelBacked),
            batch.count_by_method(EstimationMethod::RuleBased),
        );
        Ok(batch)
    }

    fn check_ids(hospitals: &[HospitalState]) -> Result<(), BatchAbort> {
        let mut seen = HashSet::new();
        for hospital in hospitals {
            if hospital.id.trim().is_empty() {
                return Err(BatchAbort::EmptyHospitalId);
            }
            if !seen.insert(hospital.id.as_str()) {
                return Err(BatchAbort::DuplicateHospital(hospital.id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 6).unwrap().and_hms_opt(14, 0, 0).unwrap()
    }

    fn driver() -> BatchDriver {
        BatchDriver::new(Arc::new(FallbackOrchestrator::rule_only("test"))).with_max_concurrency(2)
    }

    #[tokio::test]
    async fn test_one_prediction_per_hospital() {
        let hospitals: Vec<_> = (0..5)
            .map(|i| HospitalState::new(format!("h{}", i), "H").with_wait(20 + i * 10))
            .collect();
        let batch = driver()
            .run(&hospitals, &WeatherRecord::default(), &TrafficRecord::default(), &AuxiliaryFeeds::new(), at())
            .await
            .unwrap();

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.count_by_method(EstimationMethod::RuleBased), 5);
        assert_eq!(batch.get("h3").unwrap().current_wait_minutes, 50);
    }

    #[tokio::test]
    async fn test_duplicate_ids_abort() {
        let hospitals = vec![HospitalState::new("a", "A"), HospitalState::new("a", "A again")];
        let err = driver()
            .run(&hospitals, &WeatherRecord::default(), &TrafficRecord::default(), &AuxiliaryFeeds::new(), at())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchAbort::DuplicateHospital(id) if id == "a"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let batch = driver()
            .run(&[], &WeatherRecord::default(), &TrafficRecord::default(), &AuxiliaryFeeds::new(), at())
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}
