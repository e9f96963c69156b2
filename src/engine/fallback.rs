//! Fallback Orchestrator
//!
//! Picks the estimator, re-checks whatever it produced against the output
//! contract, and drops to the rule model on any failure. The strategy latch
//! is decided once, at construction, and never re-evaluated.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

use super::context::SignalContext;
use super::error::{BatchAbort, EstimationFailure};
use super::model::ModelBackedEstimator;
use super::prediction::Prediction;
use super::rules::RuleBasedEstimator;

enum Strategy {
    ModelBacked(ModelBackedEstimator),
    RuleBased { reason: String },
}

/// Snapshot of the orchestrator's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FallbackStats {
    /// Predictions served by the model-backed estimator.
    pub model_backed: u64,
    /// Model-backed attempts that fell back to the rule model.
    pub fallbacks: u64,
    /// Predictions made by the rule model because the model path is disabled.
    pub rule_only: u64,
    pub fallback_reasons: BTreeMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    model_backed: AtomicU64,
    fallbacks: AtomicU64,
    rule_only: AtomicU64,
    reasons: Mutex<BTreeMap<&'static str, u64>>,
}

impl Counters {
    fn record_fallback(&self, failure: &EstimationFailure) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        let mut reasons = self.reasons.lock().unwrap_or_else(|e| e.into_inner());
        *reasons.entry(failure.kind()).or_insert(0) += 1;
    }

    fn snapshot(&self) -> FallbackStats {
        let reasons = self.reasons.lock().unwrap_or_else(|e| e.into_inner());
        FallbackStats {
            model_backed: self.model_backed.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            rule_only: self.rule_only.load(Ordering::Relaxed),
            fallback_reasons: reasons.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

/// What the health route reports about the strategy latch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStatus {
    pub model_backed_enabled: bool,
    pub backend: Option<String>,
    pub model: Option<String>,
    pub disabled_reason: Option<String>,
}

pub struct FallbackOrchestrator {
    strategy: Strategy,
    rules: RuleBasedEstimator,
    counters: Counters,
}

impl FallbackOrchestrator {
    /// Rule model only, e.g. when no credential is configured.
    pub fn rule_only(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Model-backed strategy disabled: {}. Predictions will use the rule model.", reason);
        Self {
            strategy: Strategy::RuleBased { reason },
            rules: RuleBasedEstimator::new(),
            counters: Counters::default(),
        }
    }

    /// Run the startup self-test and latch the strategy on its outcome.
    pub async fn start(model: ModelBackedEstimator) -> Self {
        match model.probe().await {
            Ok(()) => {
                info!(
                    "{} connection test successful ({}). Model-backed strategy enabled.",
                    model.backend_name(),
                    model.model()
                );
                Self::without_self_test(model)
            }
            Err(e) => {
                error!("{} connection test failed: {}", model.backend_name(), e);
                Self::rule_only(format!("startup self-test failed: {}", e))
            }
        }
    }

    /// Enable the model-backed strategy without probing the backend.
    pub fn without_self_test(model: ModelBackedEstimator) -> Self {
        Self {
            strategy: Strategy::ModelBacked(model),
            rules: RuleBasedEstimator::new(),
            counters: Counters::default(),
        }
    }

    pub fn model_backed_enabled(&self) -> bool {
        matches!(self.strategy, Strategy::ModelBacked(_))
    }

    /// The model-backed estimator, when the latch enabled it.
    pub fn model(&self) -> Option<&ModelBackedEstimator> {
        match &self.strategy {
            Strategy::ModelBacked(model) => Some(model),
            Strategy::RuleBased { .. } => None,
        }
    }

    pub fn status(&self) -> StrategyStatus {
        match &self.strategy {
            Strategy::ModelBacked(model) => StrategyStatus {
                model_backed_enabled: true,
                backend: Some(model.backend_name().to_string()),
                model: Some(model.model().to_string()),
                disabled_reason: None,
            },
            Strategy::RuleBased { reason } => StrategyStatus {
                model_backed_enabled: false,
                backend: None,
                model: None,
                disabled_reason: Some(reason.clone()),
            },
        }
    }

    pub fn stats(&self) -> FallbackStats {
        self.counters.snapshot()
    }

    /// One hospital, one prediction. Only a broken rule-model contract is an error.
    pub async fn predict(&self, ctx: &SignalContext) -> Result<Prediction, BatchAbort> {
        match &self.strategy {
            Strategy::ModelBacked(model) => match Self::attempt_model(model, ctx).await {
                Ok(prediction) => {
                    self.counters.model_backed.fetch_add(1, Ordering::Relaxed);
                    return Ok(prediction);
                }
                Err(failure) => {
                    warn!("Falling back to rule model for {}: {}", ctx.hospital_id, failure);
                    self.counters.record_fallback(&failure);
                }
            },
            Strategy::RuleBased { .. } => {
                self.counters.rule_only.fetch_add(1, Ordering::Relaxed);
            }
        }

        let prediction = self.rules.estimate(ctx);
        prediction.validate().map_err(|reason| BatchAbort::InvariantViolated {
            hospital_id: ctx.hospital_id.clone(),
            reason,
        })?;
        Ok(prediction)
    }

    async fn attempt_model(model: &ModelBackedEstimator, ctx: &SignalContext) -> Result<Prediction, EstimationFailure> {
        let prediction = model.estimate(ctx).await?;
        prediction.validate().map_err(EstimationFailure::SchemaViolation)?;
        Ok(prediction)
    }
}
