//! Error taxonomy for the prediction pipeline.
//!
//! `EstimationFailure` and `RuleFault` are always recovered inside the engine.
//! `BatchAbort` is the only error a caller of `generate_predictions` ever sees.

use std::time::Duration;
use thiserror::Error;

/// The model-backed path could not produce a schema-conformant estimate.
#[derive(Debug, Error)]
pub enum EstimationFailure {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend call exceeded {0:?}")]
    Timeout(Duration),

    #[error("backend rate limit exhausted")]
    RateLimited,

    #[error("response contains no JSON object")]
    NoJsonObject,

    #[error("response JSON is malformed: {0}")]
    MalformedJson(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("prediction rejected by schema check: {0}")]
    SchemaViolation(String),
}

impl EstimationFailure {
    /// Short stable label used for fallback counters.
    pub fn kind(&self) -> &'static str {
        match self {
            EstimationFailure::Backend(_) => "backend",
            EstimationFailure::Timeout(_) => "timeout",
            EstimationFailure::RateLimited => "rate_limited",
            EstimationFailure::NoJsonObject => "no_json",
            EstimationFailure::MalformedJson(_) => "malformed_json",
            EstimationFailure::MissingField(_) => "missing_field",
            EstimationFailure::InvalidField { .. } => "invalid_field",
            EstimationFailure::SchemaViolation(_) => "schema_violation",
        }
    }
}

/// Internal failure of the rule model. Recovered by the minimal prediction.
#[derive(Debug, Error)]
pub enum RuleFault {
    #[error("non-finite {horizon} horizon after adjustments")]
    NonFinite { horizon: &'static str },
}

/// An unrecovered error that fails the whole batch.
#[derive(Debug, Error)]
pub enum BatchAbort {
    #[error("hospital id `{0}` appears more than once in the batch")]
    DuplicateHospital(String),

    #[error("hospital id must not be empty")]
    EmptyHospitalId,

    #[error("rule-based prediction for `{hospital_id}` violated the output contract: {reason}")]
    InvariantViolated { hospital_id: String, reason: String },
}
