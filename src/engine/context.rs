//! Signal Context
//!
//! Flattens per-hospital state and the shared environmental feeds into one
//! read-only record. Building never fails: every missing or out-of-range
//! field is replaced with a documented default and noted in `defaulted`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const DEFAULT_CURRENT_WAIT: u32 = 30;
pub const DEFAULT_CAPACITY: f64 = 0.6;
pub const DEFAULT_TEMPERATURE_C: f64 = 20.0;

/// A collaborator-supplied record the engine never looks inside.
///
/// It can only be serialized (into prompts and API responses), which keeps
/// the core from growing logic that depends on simulated fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OpaquePayload(Value);

impl OpaquePayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self(Value::String(text.into()))
    }
}

impl From<Value> for OpaquePayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for OpaquePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Auxiliary context feeds keyed by feed name.
pub type AuxiliaryFeeds = BTreeMap<String, OpaquePayload>;

/// Current state of one hospital as reported by the data collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HospitalState {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "current_wait_time", deserialize_with = "lenient_minutes")]
    pub current_wait_minutes: Option<i64>,
    #[serde(default)]
    pub capacity_utilization: Option<f64>,
    #[serde(default)]
    pub website_data: Option<String>,
}

/// Any JSON number, truncated to whole minutes. Anything else reads as missing.
fn lenient_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }))
}

impl HospitalState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_wait(mut self, minutes: i64) -> Self {
        self.current_wait_minutes = Some(minutes);
        self
    }

    pub fn with_capacity(mut self, utilization: f64) -> Self {
        self.capacity_utilization = Some(utilization);
        self
    }
}

/// Weather record shared by every hospital in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl WeatherRecord {
    /// Record substituted when the weather feed is unreachable.
    pub fn fallback() -> Self {
        Self {
            condition: Some("unknown".to_string()),
            temperature: Some(DEFAULT_TEMPERATURE_C),
            precipitation: Some(0.0),
            wind_speed: Some(0.0),
            source: Some("fallback".to_string()),
        }
    }
}

/// Traffic record shared by every hospital in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default)]
    pub congestion_level: Option<f64>,
    #[serde(default)]
    pub incidents: Option<u32>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Overcast,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Storm,
    Unknown,
}

impl WeatherCondition {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "clear" | "sunny" => WeatherCondition::Clear,
            "partly_cloudy" | "partly cloudy" | "cloudy" => WeatherCondition::PartlyCloudy,
            "overcast" => WeatherCondition::Overcast,
            "fog" | "foggy" | "mist" => WeatherCondition::Fog,
            "drizzle" | "freezing_drizzle" => WeatherCondition::Drizzle,
            "rain" | "rainy" | "rain_showers" | "freezing_rain" => WeatherCondition::Rain,
            "snow" | "snowy" | "snow_showers" => WeatherCondition::Snow,
            "storm" | "stormy" | "thunderstorm" => WeatherCondition::Storm,
            _ => WeatherCondition::Unknown,
        }
    }

    /// Conditions the rule model treats as severe.
    pub fn is_severe(&self) -> bool {
        matches!(self, WeatherCondition::Storm | WeatherCondition::Rain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::PartlyCloudy => "partly_cloudy",
            WeatherCondition::Overcast => "overcast",
            WeatherCondition::Fog => "fog",
            WeatherCondition::Drizzle => "drizzle",
            WeatherCondition::Rain => "rain",
            WeatherCondition::Snow => "snow",
            WeatherCondition::Storm => "storm",
            WeatherCondition::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl TrafficLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "light" => TrafficLevel::Low,
            "medium" | "moderate" => TrafficLevel::Medium,
            "high" | "heavy" => TrafficLevel::High,
            _ => TrafficLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLevel::Low => "low",
            TrafficLevel::Medium => "medium",
            TrafficLevel::High => "high",
            TrafficLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an estimator may look at for one hospital, one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalContext {
    pub hospital_id: String,
    pub hospital_name: String,
    pub current_wait_minutes: u32,
    pub capacity_utilization: f64,
    pub weather_condition: WeatherCondition,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub wind_speed: f64,
    pub traffic_level: TrafficLevel,
    pub hour_of_day: u32,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub website_data: Option<String>,
    pub auxiliary: AuxiliaryFeeds,
    /// Fields that fell back to a default while building.
    #[serde(skip)]
    pub defaulted: Vec<&'static str>,
}

impl SignalContext {
    pub fn build(
        hospital: &HospitalState,
        weather: &WeatherRecord,
        traffic: &TrafficRecord,
        auxiliary: &AuxiliaryFeeds,
        at: NaiveDateTime,
    ) -> Self {
        let mut defaulted = Vec::new();

        let current_wait_minutes = match hospital.current_wait_minutes {
            Some(w) if w >= 0 => u32::try_from(w).unwrap_or(u32::MAX),
            _ => {
                defaulted.push("current_wait_minutes");
                DEFAULT_CURRENT_WAIT
            }
        };

        let capacity_utilization = match hospital.capacity_utilization {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => {
                defaulted.push("capacity_utilization");
                DEFAULT_CAPACITY
            }
        };

        let weather_condition = match weather.condition.as_deref() {
            Some(raw) => WeatherCondition::parse(raw),
            None => {
                defaulted.push("weather_condition");
                WeatherCondition::Unknown
            }
        };

        let temperature_c = finite_or(weather.temperature, DEFAULT_TEMPERATURE_C, "temperature_c", &mut defaulted);
        let precipitation_mm = non_negative_or_zero(weather.precipitation, "precipitation_mm", &mut defaulted);
        let wind_speed = non_negative_or_zero(weather.wind_speed, "wind_speed", &mut defaulted);

        let traffic_level = match traffic.level.as_deref() {
            Some(raw) => TrafficLevel::parse(raw),
            None => {
                defaulted.push("traffic_level");
                TrafficLevel::Unknown
            }
        };

        if !defaulted.is_empty() {
            debug!("Context for {} filled defaults for: {}", hospital.id, defaulted.join(", "));
        }

        Self {
            hospital_id: hospital.id.clone(),
            hospital_name: hospital.name.clone(),
            current_wait_minutes,
            capacity_utilization,
            weather_condition,
            temperature_c,
            precipitation_mm,
            wind_speed,
            traffic_level,
            hour_of_day: at.hour(),
            day_of_week: at.weekday().num_days_from_monday(),
            website_data: hospital.website_data.clone(),
            auxiliary: auxiliary.clone(),
            defaulted,
        }
    }
}

fn finite_or(value: Option<f64>, default: f64, field: &'static str, defaulted: &mut Vec<&'static str>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => {
            defaulted.push(field);
            default
        }
    }
}

fn non_negative_or_zero(value: Option<f64>, field: &'static str, defaulted: &mut Vec<&'static str>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => {
            defaulted.push(field);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn monday_at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap().and_hms_opt(hour, 15, 0).unwrap()
    }

    #[test]
    fn test_build_fills_defaults_for_empty_collaborators() {
        let hospital = HospitalState::new("h1", "General");
        let ctx = SignalContext::build(
            &hospital,
            &WeatherRecord::default(),
            &TrafficRecord::default(),
            &AuxiliaryFeeds::new(),
            monday_at(3),
        );

        assert_eq!(ctx.current_wait_minutes, DEFAULT_CURRENT_WAIT);
        assert_eq!(ctx.capacity_utilization, DEFAULT_CAPACITY);
        assert_eq!(ctx.weather_condition, WeatherCondition::Unknown);
        assert_eq!(ctx.traffic_level, TrafficLevel::Unknown);
        assert_eq!(ctx.temperature_c, DEFAULT_TEMPERATURE_C);
        assert_eq!(ctx.precipitation_mm, 0.0);
        assert!(ctx.defaulted.contains(&"capacity_utilization"));
        assert!(ctx.defaulted.contains(&"traffic_level"));
    }

    #[test]
    fn test_build_clamps_and_rejects_bad_values() {
        let hospital = HospitalState::new("h1", "General").with_wait(-4).with_capacity(1.7);
        let weather = WeatherRecord {
            condition: Some("Thunderstorm".into()),
            temperature: Some(f64::NAN),
            precipitation: Some(-2.0),
            wind_speed: Some(4.5),
            source: None,
        };
        let ctx = SignalContext::build(
            &hospital,
            &weather,
            &TrafficRecord::default(),
            &AuxiliaryFeeds::new(),
            monday_at(9),
        );

        assert_eq!(ctx.current_wait_minutes, DEFAULT_CURRENT_WAIT);
        assert_eq!(ctx.capacity_utilization, 1.0);
        assert_eq!(ctx.weather_condition, WeatherCondition::Storm);
        assert_eq!(ctx.temperature_c, DEFAULT_TEMPERATURE_C);
        assert_eq!(ctx.precipitation_mm, 0.0);
        assert_eq!(ctx.wind_speed, 4.5);
    }

    #[test]
    fn test_hospital_wait_accepts_any_number() {
        let parse = |raw: serde_json::Value| -> HospitalState { serde_json::from_value(raw).unwrap() };

        assert_eq!(parse(json!({"id": "a", "current_wait_time": 45.5})).current_wait_minutes, Some(45));
        assert_eq!(parse(json!({"id": "a", "current_wait_minutes": 20})).current_wait_minutes, Some(20));
        assert_eq!(parse(json!({"id": "a", "current_wait_time": "soon"})).current_wait_minutes, None);
        assert_eq!(parse(json!({"id": "a", "current_wait_time": null})).current_wait_minutes, None);
        assert_eq!(parse(json!({"id": "a"})).current_wait_minutes, None);

        let ctx = SignalContext::build(
            &parse(json!({"id": "a", "current_wait_time": 45.9})),
            &WeatherRecord::default(),
            &TrafficRecord::default(),
            &AuxiliaryFeeds::new(),
            monday_at(9),
        );
        assert_eq!(ctx.current_wait_minutes, 45);
        assert!(!ctx.defaulted.contains(&"current_wait_minutes"));
    }

    #[test]
    fn test_clock_fields() {
        // 2024-01-13 is a Saturday.
        let at = NaiveDate::from_ymd_opt(2024, 1, 13).unwrap().and_hms_opt(19, 0, 0).unwrap();
        let ctx = SignalContext::build(
            &HospitalState::new("h", "H").with_wait(10),
            &WeatherRecord::default(),
            &TrafficRecord::default(),
            &AuxiliaryFeeds::new(),
            at,
        );
        assert_eq!(ctx.hour_of_day, 19);
        assert_eq!(ctx.day_of_week, 5);
    }

    #[test]
    fn test_condition_aliases() {
        assert_eq!(WeatherCondition::parse("rainy"), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::parse("rain_showers"), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::parse("stormy"), WeatherCondition::Storm);
        assert_eq!(WeatherCondition::parse("snow_showers"), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::parse("volcanic ash"), WeatherCondition::Unknown);
        assert!(!WeatherCondition::Drizzle.is_severe());
        assert_eq!(TrafficLevel::parse("Heavy"), TrafficLevel::High);
    }

    #[test]
    fn test_opaque_payload_display() {
        assert_eq!(OpaquePayload::text("Not available").to_string(), "Not available");
        let p = OpaquePayload::new(json!({"total_calls": 3}));
        assert_eq!(p.to_string(), r#"{"total_calls":3}"#);
    }
}
