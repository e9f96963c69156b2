//! ER wait-time prediction & fallback engine
//!
//! Forecasts emergency-room waits one, two and four hours ahead for a set of
//! hospitals. A generative model produces the estimate when one is configured
//! and healthy; a deterministic rule model covers every other case, so a
//! batch always yields one schema-valid prediction per hospital.

pub mod config;
pub mod engine;
pub mod feeds;
pub mod llm;
pub mod server;
pub mod telemetry;
pub mod utils;

pub use engine::{BatchResult, Prediction, PredictionEngine};
