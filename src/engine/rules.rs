//! Rule-Based Estimator
//!
//! Deterministic multiplicative model over a `SignalContext`. This is the
//! terminal strategy: `estimate` always returns a contract-valid prediction.

use tracing::warn;

use super::context::SignalContext;
use super::error::RuleFault;
use super::prediction::{
    bound_horizon, Advice, EstimationMethod, Prediction, DEFAULT_FACTOR, DEFAULT_RISK_ASSESSMENT, HORIZON_FLOOR,
};

pub const RULE_CONFIDENCE: u8 = 75;
pub const RULE_RISK_ASSESSMENT: &str = "Moderate risk based on current conditions";
pub const PEAK_HOURS: [u32; 6] = [8, 9, 10, 18, 19, 20];
const CAPACITY_THRESHOLD: f64 = 0.8;

/// Base multipliers applied to the current wait for 1h / 2h / 4h.
const BASE: [f64; 3] = [1.0, 1.2, 1.5];

/// One multiplicative adjustment. Applied in table order.
struct Adjustment {
    factor: &'static str,
    multipliers: [f64; 3],
    applies: fn(&SignalContext) -> bool,
}

fn high_capacity(ctx: &SignalContext) -> bool {
    ctx.capacity_utilization > CAPACITY_THRESHOLD
}

fn severe_weather(ctx: &SignalContext) -> bool {
    ctx.weather_condition.is_severe()
}

fn heavy_traffic(ctx: &SignalContext) -> bool {
    ctx.traffic_level == super::context::TrafficLevel::High
}

fn peak_hours(ctx: &SignalContext) -> bool {
    PEAK_HOURS.contains(&ctx.hour_of_day)
}

const ADJUSTMENTS: [Adjustment; 4] = [
    Adjustment { factor: "High capacity utilization", multipliers: [1.3, 1.4, 1.5], applies: high_capacity },
    Adjustment { factor: "Severe weather conditions", multipliers: [1.2, 1.3, 1.4], applies: severe_weather },
    Adjustment { factor: "Heavy traffic", multipliers: [1.1, 1.2, 1.3], applies: heavy_traffic },
    Adjustment { factor: "Peak hours", multipliers: [1.2, 1.3, 1.4], applies: peak_hours },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedEstimator;

impl RuleBasedEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Never fails. Internal faults degrade to `minimal`.
    pub fn estimate(&self, ctx: &SignalContext) -> Prediction {
        match self.try_estimate(ctx) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("Rule model fault for {}: {}. Emitting minimal prediction.", ctx.hospital_id, e);
                Self::minimal(ctx)
            }
        }
    }

    /// Horizons are the current wait times the base multipliers, times every
    /// adjustment that fires, truncated toward zero and then bounded.
    pub fn try_estimate(&self, ctx: &SignalContext) -> Result<Prediction, RuleFault> {
        let current = f64::from(ctx.current_wait_minutes);
        let mut raw = BASE.map(|m| current * m);
        let mut factors = Vec::new();

        for adjustment in ADJUSTMENTS.iter().filter(|a| (a.applies)(ctx)) {
            for (value, multiplier) in raw.iter_mut().zip(adjustment.multipliers) {
                *value *= multiplier;
            }
            factors.push(adjustment.factor.to_string());
        }

        for (value, horizon) in raw.iter().zip(["1h", "2h", "4h"]) {
            if !value.is_finite() {
                return Err(RuleFault::NonFinite { horizon });
            }
        }

        if factors.is_empty() {
            factors.push(DEFAULT_FACTOR.to_string());
        }

        // `as` saturates, so oversized values land on the ceiling via bound_horizon.
        let [h1, h2, h4] = raw.map(|v| bound_horizon(v.trunc() as u32));

        Ok(Prediction {
            hospital_id: ctx.hospital_id.clone(),
            current_wait_minutes: ctx.current_wait_minutes,
            horizon_1h: h1,
            horizon_2h: h2,
            horizon_4h: h4,
            confidence: RULE_CONFIDENCE,
            factors,
            recommendation: Advice::for_one_hour_wait(raw[0]).as_str().to_string(),
            risk_assessment: RULE_RISK_ASSESSMENT.to_string(),
            method: EstimationMethod::RuleBased,
        })
    }

    /// Hardcoded last-resort prediction: the current wait echoed on every horizon.
    pub fn minimal(ctx: &SignalContext) -> Prediction {
        let horizon = bound_horizon(ctx.current_wait_minutes.max(HORIZON_FLOOR));
        Prediction {
            hospital_id: ctx.hospital_id.clone(),
            current_wait_minutes: ctx.current_wait_minutes,
            horizon_1h: horizon,
            horizon_2h: horizon,
            horizon_4h: horizon,
            confidence: RULE_CONFIDENCE,
            factors: vec![DEFAULT_FACTOR.to_string()],
            recommendation: Advice::for_one_hour_wait(f64::from(ctx.current_wait_minutes)).as_str().to_string(),
            risk_assessment: DEFAULT_RISK_ASSESSMENT.to_string(),
            method: EstimationMethod::RuleBased,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{AuxiliaryFeeds, HospitalState, TrafficRecord, WeatherRecord};
    use crate::engine::prediction::HORIZON_CEILING;
    use chrono::NaiveDate;

    fn ctx(wait: i64, capacity: f64, weather: &str, traffic: &str, hour: u32) -> SignalContext {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(hour, 0, 0).unwrap();
        SignalContext::build(
            &HospitalState::new("h1", "General").with_wait(wait).with_capacity(capacity),
            &WeatherRecord { condition: Some(weather.into()), ..Default::default() },
            &TrafficRecord { level: Some(traffic.into()), ..Default::default() },
            &AuxiliaryFeeds::new(),
            at,
        )
    }

    #[test]
    fn test_capacity_and_peak_scenario() {
        let p = RuleBasedEstimator::new().estimate(&ctx(40, 0.85, "clear", "medium", 9));
        assert_eq!(p.horizons(), [62, 87, 125]);
        assert_eq!(p.factors, vec!["High capacity utilization", "Peak hours"]);
        assert_eq!(p.recommendation, "Go now");
        assert_eq!(p.confidence, RULE_CONFIDENCE);
        assert_eq!(p.method, EstimationMethod::RuleBased);
    }

    #[test]
    fn test_no_adjustments_uses_default_factor() {
        let p = RuleBasedEstimator::new().estimate(&ctx(50, 0.5, "clear", "low", 14));
        assert_eq!(p.horizons(), [50, 60, 75]);
        assert_eq!(p.factors, vec![DEFAULT_FACTOR]);
        assert_eq!(p.recommendation, "Wait");
    }

    #[test]
    fn test_floor_applies_to_tiny_waits() {
        let p = RuleBasedEstimator::new().estimate(&ctx(3, 0.5, "clear", "low", 12));
        assert_eq!(p.horizons(), [5, 5, 5]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_ceiling_and_alternatives_for_extreme_load() {
        let p = RuleBasedEstimator::new().estimate(&ctx(100, 0.9, "storm", "high", 19));
        assert_eq!(p.horizons(), [205, HORIZON_CEILING, HORIZON_CEILING]);
        assert_eq!(p.factors.len(), 4);
        assert_eq!(p.recommendation, "Consider alternatives");
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let c = ctx(70, 0.5, "clear", "high", 12);
        let est = RuleBasedEstimator::new();
        let a = est.estimate(&c);
        let b = est.estimate(&c);
        assert_eq!(a, b);
        assert_eq!(a.horizons(), [77, 100, 136]);
    }

    #[test]
    fn test_capacity_crossing_never_lowers_horizons() {
        let est = RuleBasedEstimator::new();
        for wait in [0, 7, 33, 64, 150, 280] {
            for hour in [2, 9, 15, 19] {
                let low = est.estimate(&ctx(wait, 0.8, "rain", "high", hour));
                let high = est.estimate(&ctx(wait, 0.81, "rain", "high", hour));
                for (l, h) in low.horizons().iter().zip(high.horizons()) {
                    assert!(h >= *l, "wait={} hour={}", wait, hour);
                }
            }
        }
    }

    #[test]
    fn test_minimal_prediction_is_contract_valid() {
        let p = RuleBasedEstimator::minimal(&ctx(0, 0.5, "clear", "low", 0));
        assert_eq!(p.horizons(), [5, 5, 5]);
        assert!(p.validate().is_ok());
    }
}
