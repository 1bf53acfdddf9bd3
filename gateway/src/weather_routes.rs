//! Weather API routes
//!
//! Live conditions come from OpenWeatherMap. The history endpoint is
//! synthesized from the current observation.

use axum::{
    extract::{Query, State},
    Json,
};
use disaster_risk::RiskError;
use serde::{Deserialize, Serialize};

use crate::routes::{ApiError, AppState};
use crate::weather::{synthesize_history, CurrentWeather, HistoryDay, DEFAULT_HISTORY_DAYS};

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    #[serde(default)]
    pub location: String,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct WeatherHistoryResponse {
    pub location: String,
    pub days: Vec<HistoryDay>,
}

fn required_location(query: &WeatherQuery) -> Result<&str, ApiError> {
    let location = query.location.trim();
    if location.is_empty() {
        return Err(RiskError::InvalidInput("location query parameter is required".into()).into());
    }
    Ok(location)
}

/// Current weather for a named location
pub async fn current_weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<CurrentWeather>, ApiError> {
    let location = required_location(&query)?;
    let current = state
        .weather
        .fetch_current(location)
        .await
        .map_err(RiskError::from)?;
    Ok(Json(current))
}

/// Multi-day history derived from current conditions
pub async fn weather_history(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherHistoryResponse>, ApiError> {
    let location = required_location(&query)?;
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let current = state
        .weather
        .fetch_current(location)
        .await
        .map_err(RiskError::from)?;

    let today = chrono::Local::now().date_naive();
    Ok(Json(WeatherHistoryResponse {
        location: current.location,
        days: synthesize_history(&current.observation, days, today),
    }))
}
