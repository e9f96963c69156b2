//! Prediction output contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// No horizon is ever emitted below this many minutes.
pub const HORIZON_FLOOR: u32 = 5;
/// No horizon is ever emitted above this many minutes.
pub const HORIZON_CEILING: u32 = 300;
pub const MAX_CONFIDENCE: u8 = 100;
/// Used when an estimator names no factors.
pub const DEFAULT_FACTOR: &str = "Current wait time";
pub const DEFAULT_RISK_ASSESSMENT: &str = "Not assessed";

/// Which estimator produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    ModelBacked,
    RuleBased,
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::ModelBacked => write!(f, "model_backed"),
            EstimationMethod::RuleBased => write!(f, "rule_based"),
        }
    }
}

/// The closed recommendation vocabulary of the rule model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    Wait,
    GoNow,
    ConsiderAlternatives,
}

impl Advice {
    /// Advice for a projected one-hour wait, in minutes.
    pub fn for_one_hour_wait(minutes: f64) -> Self {
        if minutes > 90.0 {
            Advice::ConsiderAlternatives
        } else if minutes > 60.0 {
            Advice::GoNow
        } else {
            Advice::Wait
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Advice::Wait => "Wait",
            Advice::GoNow => "Go now",
            Advice::ConsiderAlternatives => "Consider alternatives",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub hospital_id: String,
    pub current_wait_minutes: u32,
    pub horizon_1h: u32,
    pub horizon_2h: u32,
    pub horizon_4h: u32,
    pub confidence: u8,
    pub factors: Vec<String>,
    pub recommendation: String,
    pub risk_assessment: String,
    pub method: EstimationMethod,
}

impl Prediction {
    pub fn horizons(&self) -> [u32; 3] {
        [self.horizon_1h, self.horizon_2h, self.horizon_4h]
    }

    /// Full output-contract check applied to every prediction before it
    /// leaves the engine, whichever estimator produced it.
    pub fn validate(&self) -> Result<(), String> {
        if self.hospital_id.trim().is_empty() {
            return Err("hospital_id is empty".to_string());
        }
        for (label, value) in [("1h", self.horizon_1h), ("2h", self.horizon_2h), ("4h", self.horizon_4h)] {
            if !(HORIZON_FLOOR..=HORIZON_CEILING).contains(&value) {
                return Err(format!(
                    "{} horizon {} outside [{}, {}]",
                    label, value, HORIZON_FLOOR, HORIZON_CEILING
                ));
            }
        }
        if self.confidence > MAX_CONFIDENCE {
            return Err(format!("confidence {} above {}", self.confidence, MAX_CONFIDENCE));
        }
        if self.factors.is_empty() {
            return Err("factors is empty".to_string());
        }
        if self.factors.iter().any(|f| f.trim().is_empty()) {
            return Err("factors contains a blank entry".to_string());
        }
        if self.recommendation.trim().is_empty() {
            return Err("recommendation is empty".to_string());
        }
        Ok(())
    }
}

/// Bound a horizon into `[HORIZON_FLOOR, HORIZON_CEILING]`.
pub fn bound_horizon(minutes: u32) -> u32 {
    minutes.clamp(HORIZON_FLOOR, HORIZON_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Prediction {
        Prediction {
            hospital_id: "h1".into(),
            current_wait_minutes: 30,
            horizon_1h: 30,
            horizon_2h: 36,
            horizon_4h: 45,
            confidence: 75,
            factors: vec![DEFAULT_FACTOR.into()],
            recommendation: "Wait".into(),
            risk_assessment: DEFAULT_RISK_ASSESSMENT.into(),
            method: EstimationMethod::RuleBased,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_each_violation() {
        let mut p = sample();
        p.horizon_2h = 4;
        assert!(p.validate().unwrap_err().contains("2h"));

        let mut p = sample();
        p.horizon_4h = 301;
        assert!(p.validate().is_err());

        let mut p = sample();
        p.confidence = 101;
        assert!(p.validate().is_err());

        let mut p = sample();
        p.factors.clear();
        assert!(p.validate().is_err());

        let mut p = sample();
        p.factors.push(" ".into());
        assert!(p.validate().unwrap_err().contains("blank"));

        let mut p = sample();
        p.hospital_id = "  ".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_advice_thresholds() {
        assert_eq!(Advice::for_one_hour_wait(60.0), Advice::Wait);
        assert_eq!(Advice::for_one_hour_wait(60.5), Advice::GoNow);
        assert_eq!(Advice::for_one_hour_wait(90.0), Advice::GoNow);
        assert_eq!(Advice::for_one_hour_wait(91.0).as_str(), "Consider alternatives");
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&EstimationMethod::ModelBacked).unwrap();
        assert_eq!(json, "\"model_backed\"");
        assert_eq!(EstimationMethod::RuleBased.to_string(), "rule_based");
    }
}
