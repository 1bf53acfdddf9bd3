//! OpenWeatherMap client and synthesized multi-day history
//!
//! Current conditions come from the OpenWeatherMap current-weather endpoint
//! (`units=metric`). The free tier has no history, so the multi-day series is
//! derived from the current observation.

use chrono::NaiveDate;
use disaster_risk::{RiskError, WeatherObservation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const OPENWEATHERMAP_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_HISTORY_DAYS: u32 = 3;
pub const MAX_HISTORY_DAYS: u32 = 30;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeatherError {
    #[error("WEATHER_API_KEY is not configured")]
    MissingApiKey,
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<WeatherError> for RiskError {
    fn from(e: WeatherError) -> Self {
        RiskError::Upstream(e.to_string())
    }
}

/// Current conditions at a named location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeather {
    pub location: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub observation: WeatherObservation,
}

/// One day of synthesized history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDay {
    pub date: String,
    pub temp: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub description: String,
}

impl HistoryDay {
    /// As an observation; pressure and rainfall are not synthesized
    pub fn observation(&self) -> WeatherObservation {
        WeatherObservation::new(self.temp, self.humidity, self.wind_speed)
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    name: Option<String>,
    main: OwmMain,
    wind: OwmWind,
    #[serde(default)]
    rain: Option<OwmRain>,
    #[serde(default)]
    weather: Vec<OwmDescription>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: f64,
    #[serde(default)]
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmDescription {
    description: String,
}

impl OwmResponse {
    fn into_current(self, query: &str) -> CurrentWeather {
        CurrentWeather {
            location: self.name.unwrap_or_else(|| query.to_string()),
            description: self.weather.into_iter().next().map(|w| w.description),
            observation: WeatherObservation {
                temperature: self.main.temp,
                humidity: self.main.humidity,
                wind_speed: self.wind.speed,
                pressure: self.main.pressure,
                rainfall: self.rain.and_then(|r| r.one_hour),
            },
        }
    }
}

/// Parse an OpenWeatherMap current-weather body
pub fn parse_current(body: &str, query: &str) -> Result<CurrentWeather, WeatherError> {
    serde_json::from_str::<OwmResponse>(body)
        .map(|r| r.into_current(query))
        .map_err(|e| WeatherError::ParseError(e.to_string()))
}

/// Live weather client
#[derive(Debug, Clone)]
pub struct WeatherClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::RequestFailed(e.to_string()))?;

        Ok(Self {
            api_key,
            base_url: OPENWEATHERMAP_URL.to_string(),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch current weather for a location name
    pub async fn fetch_current(&self, location: &str) -> Result<CurrentWeather, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", location), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| WeatherError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WeatherError::ApiError(format!(
                "OpenWeatherMap returned status: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::RequestFailed(e.to_string()))?;

        let current = parse_current(&body, location)?;
        tracing::debug!(
            "Weather for {}: {:.1}°C {:.0}% {:.1} m/s",
            location,
            current.observation.temperature,
            current.observation.humidity,
            current.observation.wind_speed
        );
        Ok(current)
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Derive `days` days of history ending yesterday from one observation.
///
/// Day `i` (oldest first) is dated `today - (days - i)` with temperature
/// `+0.5·i`, humidity `-3·i` clamped to [30, 90] and wind `+0.3·i`.
pub fn synthesize_history(
    current: &WeatherObservation,
    days: u32,
    today: NaiveDate,
) -> Vec<HistoryDay> {
    let days = days.min(MAX_HISTORY_DAYS);
    (0..days)
        .map(|i| {
            let offset = chrono::Duration::days(i64::from(days - i));
            let step = f64::from(i);
            HistoryDay {
                date: (today - offset).format("%Y-%m-%d").to_string(),
                temp: round1(current.temperature + step * 0.5),
                humidity: (current.humidity - step * 3.0).clamp(30.0, 90.0),
                wind_speed: round1(current.wind_speed + step * 0.3),
                description: match i {
                    0 => "Partly Cloudy",
                    1 => "Rainy",
                    _ => "Clear",
                }
                .to_string(),
            }
        })
        .collect()
}
