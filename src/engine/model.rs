//! Model-Backed Estimator
//!
//! Asks a generative model for a JSON estimate, then extracts and validates
//! it. Any problem along the way is an `EstimationFailure`; a partially
//! filled prediction is never returned.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::context::SignalContext;
use super::error::EstimationFailure;
use super::prediction::{
    bound_horizon, EstimationMethod, Prediction, DEFAULT_FACTOR, DEFAULT_RISK_ASSESSMENT, HORIZON_CEILING,
    MAX_CONFIDENCE,
};
use crate::llm::{LLMProvider, RateLimiter};
use crate::utils::{truncate_text, TruncationPolicy};

pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);
pub const PROBE_PROMPT: &str = "Test connection";

/// Fields the model must return.
pub const REQUIRED_FIELDS: [&str; 6] = ["1h", "2h", "4h", "confidence", "factors", "recommendation"];

pub struct ModelBackedEstimator {
    provider: Arc<dyn LLMProvider>,
    model: String,
    timeout: Duration,
    limiter: Option<Arc<RateLimiter>>,
}

impl ModelBackedEstimator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
            limiter: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One backend call, no retries.
    pub async fn estimate(&self, ctx: &SignalContext) -> Result<Prediction, EstimationFailure> {
        let response = self.complete(build_prompt(ctx)).await?;
        let estimate = parse_estimate(&response)?;
        Ok(estimate.into_prediction(ctx))
    }

    /// Lightweight startup call used to decide whether the strategy is enabled.
    pub async fn probe(&self) -> Result<(), EstimationFailure> {
        self.complete(PROBE_PROMPT.to_string()).await.map(|_| ())
    }

    /// Rate-limited, time-bounded single completion.
    pub async fn complete(&self, prompt: String) -> Result<String, EstimationFailure> {
        if let Some(limiter) = &self.limiter {
            if !limiter.try_acquire() {
                return Err(EstimationFailure::RateLimited);
            }
        }

        let call = self.provider.generate(&self.model, prompt, None);
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| EstimationFailure::Timeout(self.timeout))?
            .map_err(|e| EstimationFailure::Backend(format!("{:#}", e)))?;

        debug!(
            "{} response: {}",
            self.provider.name(),
            truncate_text(&response, TruncationPolicy::Bytes(240))
        );
        Ok(response)
    }
}

/// Prompt embedding the full context, auxiliary feeds included verbatim.
pub fn build_prompt(ctx: &SignalContext) -> String {
    let auxiliary = if ctx.auxiliary.is_empty() {
        "- None provided".to_string()
    } else {
        ctx.auxiliary
            .iter()
            .map(|(name, payload)| format!("- {}: {}", name.replace('_', " "), payload))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are an expert emergency room wait time predictor. Analyze the following data and predict wait times.

HOSPITAL DATA:
- Hospital: {name}
- Current wait time: {wait} minutes
- Capacity utilization: {capacity:.1}%
- Hospital website data: {website}

WEATHER CONDITIONS:
- Weather condition: {weather}
- Temperature: {temperature}°C
- Precipitation: {precipitation}mm
- Wind speed: {wind} m/s

TRAFFIC:
- Traffic level: {traffic}

TIME:
- Current hour: {hour}
- Day of week: {day} (0=Monday, 6=Sunday)

ADDITIONAL CONTEXT:
{auxiliary}

Consider weather impact (storms increase accidents), traffic patterns, time of day and day of week, capacity, local events, emergency dispatch volume and community health alerts.
Predict the wait time in 1, 2 and 4 hours as whole minutes between 5 and 300.

Respond with ONLY valid JSON in this exact format:
{{"1h": 45, "2h": 60, "4h": 90, "confidence": 85, "factors": ["High capacity", "Peak hours"], "recommendation": "Wait", "risk_assessment": "Moderate weather-related incident risk"}}"#,
        name = if ctx.hospital_name.is_empty() { &ctx.hospital_id } else { &ctx.hospital_name },
        wait = ctx.current_wait_minutes,
        capacity = ctx.capacity_utilization * 100.0,
        website = ctx.website_data.as_deref().unwrap_or("Not available"),
        weather = ctx.weather_condition,
        temperature = ctx.temperature_c,
        precipitation = ctx.precipitation_mm,
        wind = ctx.wind_speed,
        traffic = ctx.traffic_level,
        hour = ctx.hour_of_day,
        day = ctx.day_of_week,
        auxiliary = auxiliary,
    )
}

/// First balanced `{...}` span in free text. Braces inside JSON strings
/// do not count toward the balance.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A validated model answer, before it is bound to a hospital.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEstimate {
    pub horizons: [u32; 3],
    pub confidence: u8,
    pub factors: Vec<String>,
    pub recommendation: String,
    pub risk_assessment: String,
}

impl ModelEstimate {
    /// Horizons below the floor are raised to it; the ceiling was enforced during parsing.
    pub fn into_prediction(self, ctx: &SignalContext) -> Prediction {
        let [h1, h2, h4] = self.horizons.map(bound_horizon);
        let factors = if self.factors.is_empty() {
            vec![DEFAULT_FACTOR.to_string()]
        } else {
            self.factors
        };
        Prediction {
            hospital_id: ctx.hospital_id.clone(),
            current_wait_minutes: ctx.current_wait_minutes,
            horizon_1h: h1,
            horizon_2h: h2,
            horizon_4h: h4,
            confidence: self.confidence,
            factors,
            recommendation: self.recommendation,
            risk_assessment: self.risk_assessment,
            method: EstimationMethod::ModelBacked,
        }
    }
}

pub fn parse_estimate(response: &str) -> Result<ModelEstimate, EstimationFailure> {
    let span = extract_json_object(response.trim()).ok_or(EstimationFailure::NoJsonObject)?;
    let value: Value = serde_json::from_str(span).map_err(|e| EstimationFailure::MalformedJson(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| EstimationFailure::MalformedJson("top-level value is not an object".to_string()))?;

    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(EstimationFailure::MissingField(field));
        }
    }

    let horizons = [horizon(obj, "1h")?, horizon(obj, "2h")?, horizon(obj, "4h")?];

    let confidence = whole_number(obj, "confidence")?;
    if confidence > u64::from(MAX_CONFIDENCE) {
        return Err(invalid("confidence", format!("{} is outside [0, {}]", confidence, MAX_CONFIDENCE)));
    }

    let factors = match &obj["factors"] {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| invalid("factors", "every factor must be a string"))
            })
            .filter(|factor| !matches!(factor, Ok(f) if f.is_empty()))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(invalid("factors", "expected an array")),
    };

    let recommendation = obj["recommendation"]
        .as_str()
        .ok_or_else(|| invalid("recommendation", "expected a string"))?
        .trim()
        .to_string();

    let risk_assessment = obj
        .get("risk_assessment")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_RISK_ASSESSMENT)
        .to_string();

    Ok(ModelEstimate {
        horizons,
        confidence: confidence as u8,
        factors,
        recommendation,
        risk_assessment,
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> EstimationFailure {
    EstimationFailure::InvalidField { field, reason: reason.into() }
}

/// Non-negative whole number. Integral floats such as `45.0` are accepted.
fn whole_number(obj: &Map<String, Value>, field: &'static str) -> Result<u64, EstimationFailure> {
    let value = &obj[field];
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    if let Some(n) = value.as_i64() {
        return Err(invalid(field, format!("{} is negative", n)));
    }
    match value.as_f64() {
        Some(f) if f < 0.0 => Err(invalid(field, format!("{} is negative", f))),
        Some(f) if f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u64),
        _ => Err(invalid(field, format!("expected a whole number, got {}", value))),
    }
}

fn horizon(obj: &Map<String, Value>, field: &'static str) -> Result<u32, EstimationFailure> {
    let minutes = whole_number(obj, field)?;
    if minutes > u64::from(HORIZON_CEILING) {
        return Err(invalid(field, format!("{} exceeds the {} minute ceiling", minutes, HORIZON_CEILING)));
    }
    Ok(minutes as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{AuxiliaryFeeds, HospitalState, OpaquePayload, TrafficRecord, WeatherRecord};
    use chrono::NaiveDate;
    use serde_json::json;

    fn ctx() -> SignalContext {
        let mut aux = AuxiliaryFeeds::new();
        aux.insert("dispatch_volume".into(), OpaquePayload::new(json!({"total_calls": 17, "simulated": true})));
        let at = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(18, 30, 0).unwrap();
        SignalContext::build(
            &HospitalState::new("h1", "Mercy General").with_wait(35).with_capacity(0.72),
            &WeatherRecord { condition: Some("rain".into()), temperature: Some(11.5), ..Default::default() },
            &TrafficRecord { level: Some("high".into()), ..Default::default() },
            &aux,
            at,
        )
    }

    #[test]
    fn test_extract_first_balanced_span() {
        let text = r#"Sure! {"1h": 40, "note": "use {braces}"} and later {"other": 1}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"1h": 40, "note": "use {braces}"}"#));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{ never closed"), None);
    }

    #[test]
    fn test_parse_valid_response_with_prose() {
        let text = r#"Here is my analysis:
{"1h": 45, "2h": 60.0, "4h": 2, "confidence": 85, "factors": ["Peak hours"], "recommendation": "Wait"}
Hope that helps."#;
        let est = parse_estimate(text).unwrap();
        assert_eq!(est.horizons, [45, 60, 2]);
        assert_eq!(est.confidence, 85);
        assert_eq!(est.risk_assessment, DEFAULT_RISK_ASSESSMENT);

        let p = est.into_prediction(&ctx());
        assert_eq!(p.horizons(), [45, 60, 5]);
        assert_eq!(p.method, EstimationMethod::ModelBacked);
        assert_eq!(p.current_wait_minutes, 35);
    }

    #[test]
    fn test_parse_rejects_schema_violations() {
        let base = json!({"1h": 45, "2h": 60, "4h": 90, "confidence": 85, "factors": [], "recommendation": "Wait"});

        let mut v = base.clone();
        v["1h"] = json!(-5);
        assert!(matches!(parse_estimate(&v.to_string()), Err(EstimationFailure::InvalidField { field: "1h", .. })));

        let mut v = base.clone();
        v["4h"] = json!(301);
        assert!(matches!(parse_estimate(&v.to_string()), Err(EstimationFailure::InvalidField { field: "4h", .. })));

        let mut v = base.clone();
        v["confidence"] = json!(140);
        assert!(matches!(
            parse_estimate(&v.to_string()),
            Err(EstimationFailure::InvalidField { field: "confidence", .. })
        ));

        let mut v = base.clone();
        v["2h"] = json!("60");
        assert!(parse_estimate(&v.to_string()).is_err());

        let mut v = base.clone();
        v["factors"] = json!("Peak hours");
        assert!(matches!(
            parse_estimate(&v.to_string()),
            Err(EstimationFailure::InvalidField { field: "factors", .. })
        ));

        let mut v = base.clone();
        v["recommendation"] = json!(3);
        assert!(parse_estimate(&v.to_string()).is_err());

        let mut v = base;
        v.as_object_mut().unwrap().remove("confidence");
        assert!(matches!(parse_estimate(&v.to_string()), Err(EstimationFailure::MissingField("confidence"))));
    }

    #[test]
    fn test_parse_failure_kinds() {
        assert!(matches!(parse_estimate("I cannot help with that."), Err(EstimationFailure::NoJsonObject)));
        assert!(matches!(parse_estimate("{1h: 40}"), Err(EstimationFailure::MalformedJson(_))));
    }

    #[test]
    fn test_empty_factors_get_default() {
        let est = parse_estimate(
            r#"{"1h": 45, "2h": 60, "4h": 90, "confidence": 85, "factors": [], "recommendation": "Go now"}"#,
        )
        .unwrap();
        let p = est.into_prediction(&ctx());
        assert_eq!(p.factors, vec![DEFAULT_FACTOR]);
    }

    #[test]
    fn test_blank_factors_are_dropped() {
        let est = parse_estimate(
            r#"{"1h": 45, "2h": 60, "4h": 90, "confidence": 85, "factors": ["  ", "", " Rain "], "recommendation": "Wait"}"#,
        )
        .unwrap();
        assert_eq!(est.factors, vec!["Rain"]);

        let est = parse_estimate(
            r#"{"1h": 45, "2h": 60, "4h": 90, "confidence": 85, "factors": ["  ", ""], "recommendation": "Wait"}"#,
        )
        .unwrap();
        assert!(est.factors.is_empty());
        let p = est.into_prediction(&ctx());
        assert_eq!(p.factors, vec![DEFAULT_FACTOR]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_prompt_embeds_context_and_aux_feeds() {
        let prompt = build_prompt(&ctx());
        assert!(prompt.contains("Mercy General"));
        assert!(prompt.contains("Current wait time: 35 minutes"));
        assert!(prompt.contains("Capacity utilization: 72.0%"));
        assert!(prompt.contains("Weather condition: rain"));
        assert!(prompt.contains("Traffic level: high"));
        assert!(prompt.contains("Current hour: 18"));
        assert!(prompt.contains(r#"dispatch volume: {"simulated":true,"total_calls":17}"#));
        assert!(prompt.contains("Respond with ONLY valid JSON"));
    }
}
