//! Open-Meteo current-weather client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{GeoPoint, WeatherFeed};
use crate::engine::WeatherRecord;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// WMO weather interpretation code to condition label.
pub fn condition_for_code(code: i64) -> &'static str {
    match code {
        0 | 1 => "clear",
        2 => "partly_cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51 | 53 | 55 => "drizzle",
        56 | 57 => "freezing_drizzle",
        61 | 63 | 65 => "rain",
        66 | 67 => "freezing_rain",
        71 | 73 | 75 | 77 => "snow",
        80..=82 => "rain_showers",
        85 | 86 => "snow_showers",
        95 | 96 | 99 => "thunderstorm",
        _ => "unknown",
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: Option<f64>,
    windspeed: Option<f64>,
    #[serde(alias = "weather_code")]
    weathercode: Option<i64>,
}

impl From<CurrentWeather> for WeatherRecord {
    fn from(current: CurrentWeather) -> Self {
        WeatherRecord {
            condition: Some(condition_for_code(current.weathercode.unwrap_or(0)).to_string()),
            temperature: current.temperature,
            // current_weather carries no precipitation reading
            precipitation: Some(0.0),
            wind_speed: current.windspeed,
            source: Some("open_meteo".to_string()),
        }
    }
}

pub struct OpenMeteoWeather {
    client: Client,
    base_url: String,
}

impl OpenMeteoWeather {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_METEO_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("er-wait-predictor/0.2")
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for OpenMeteoWeather {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherFeed for OpenMeteoWeather {
    async fn current(&self, location: GeoPoint) -> Result<WeatherRecord> {
        let url = format!("{}/v1/forecast", self.base_url);
        let response: ForecastResponse = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lng.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .context("Open-Meteo request failed")?
            .error_for_status()
            .context("Open-Meteo returned an error status")?
            .json()
            .await
            .context("Open-Meteo response was not the expected shape")?;

        let record = WeatherRecord::from(response.current_weather);
        info!(
            "Weather updated: {} at {:.1}C",
            record.condition.as_deref().unwrap_or("unknown"),
            record.temperature.unwrap_or_default()
        );
        Ok(record)
    }
}
