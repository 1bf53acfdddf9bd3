//! Risk and history API routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use disaster_risk::records::LocationSummary;
use disaster_risk::sequence::SEQUENCE_DAYS;
use disaster_risk::{
    DisasterRecord, LocationHistory, RiskAssessment, RiskError, RiskService, WeatherObservation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::weather::{synthesize_history, HistoryDay, WeatherClient};
use crate::weather_routes;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RiskService>,
    pub weather: Arc<WeatherClient>,
}

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/risk", post(assess_risk))
        .route("/history", post(history))
        .route("/locations", get(list_locations))
        .route("/weather", get(weather_routes::current_weather))
        .route("/weather/history", get(weather_routes::weather_history));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

// ========== Errors ==========

/// Core error mapped onto an HTTP status and JSON body
#[derive(Debug)]
pub struct ApiError(pub RiskError);

impl From<RiskError> for ApiError {
    fn from(e: RiskError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hints: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RiskError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RiskError::NotFound { .. } => StatusCode::NOT_FOUND,
            RiskError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RiskError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            RiskError::InvalidInput(msg) => tracing::debug!("Rejected request: {}", msg),
            RiskError::NotFound { query, .. } => tracing::info!("Unknown location {:?}", query),
            other => tracing::warn!("Request failed: {}", other),
        }

        let hints = match &self.0 {
            RiskError::NotFound { hints, .. } => Some(hints.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            hints,
        };
        (status, Json(body)).into_response()
    }
}

// ========== Request/Response Types ==========

#[derive(Debug, Deserialize)]
pub struct RiskRequest {
    #[serde(default)]
    pub location: String,
    pub weather: Option<WeatherObservation>,
    /// Preceding daily observations, oldest first
    pub recent: Option<Vec<WeatherObservation>>,
    /// Attach the location's historical records
    #[serde(default)]
    pub include_history: bool,
}

#[derive(Debug, Serialize)]
pub struct RiskResponse {
    pub location: String,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<DisasterRecord>>,
    /// Why history was requested but not attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub location: String,
}

// ========== Handlers ==========

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = state.service.store();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "disaster-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "records_loaded": store.is_available(),
        "record_count": store.len(),
        "overlays": state.service.overlays().names(),
        "weather_configured": state.weather.is_configured(),
    }))
}

/// Classify risk at a location, fetching live weather when none is supplied
pub async fn assess_risk(
    State(state): State<AppState>,
    Json(req): Json<RiskRequest>,
) -> Result<Json<RiskResponse>, ApiError> {
    let location = req.location.trim().to_string();
    if location.is_empty() {
        return Err(RiskError::InvalidInput("location is required".into()).into());
    }

    let weather = match req.weather {
        Some(w) => w,
        None => state
            .weather
            .fetch_current(&location)
            .await
            .map_err(RiskError::from)?
            .observation,
    };

    let recent = req.recent.unwrap_or_else(|| {
        let today = chrono::Local::now().date_naive();
        synthesize_history(&weather, (SEQUENCE_DAYS - 1) as u32, today)
            .iter()
            .map(HistoryDay::observation)
            .collect()
    });
    let assessment = state
        .service
        .assess_risk_with_history(&location, Some(weather), &recent)?;

    let mut response = RiskResponse {
        location,
        assessment,
        canonical_location: None,
        history: None,
        history_error: None,
    };
    if req.include_history {
        // the assessment stands even when the lookup fails
        match state.service.lookup(&response.location) {
            Ok(found) => {
                response.canonical_location = Some(found.location);
                response.history = Some(found.records);
            }
            Err(e) => {
                tracing::debug!("No history for {:?}: {}", response.location, e);
                response.history_error = Some(e.to_string());
            }
        }
    }
    Ok(Json(response))
}

/// Historical disasters for a resolved location
pub async fn history(
    State(state): State<AppState>,
    Json(req): Json<HistoryRequest>,
) -> Result<Json<LocationHistory>, ApiError> {
    Ok(Json(state.service.lookup(&req.location)?))
}

pub async fn list_locations(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationSummary>>, ApiError> {
    let store = state.service.store();
    if let Some(reason) = store.unavailable_reason() {
        return Err(RiskError::Unavailable(reason.to_string()).into());
    }
    Ok(Json(store.locations()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use disaster_risk::{LocationVocabulary, OverlayChain, RecordStore};
    use std::time::Duration;
    use tower::ServiceExt;

    fn record(location: &str, kind: &str, year: i32, deaths: Option<u32>) -> DisasterRecord {
        DisasterRecord {
            location: location.into(),
            disaster_type: kind.into(),
            disaster_subtype: None,
            start_year: year,
            total_deaths: deaths,
        }
    }

    pub(crate) fn test_state() -> AppState {
        let vocab = LocationVocabulary::new(["Maharashtra", "Tamil Nadu", "Uttar Pradesh"]);
        let store = RecordStore::new(
            vocab,
            vec![
                record("Tamil Nadu", "Flood", 2015, Some(289)),
                record("Tamil Nadu", "Tsunami", 2004, None),
                record("Maharashtra", "Flood", 2005, Some(1094)),
            ],
        );
        AppState {
            service: Arc::new(RiskService::new(
                Arc::new(store),
                OverlayChain::heuristic_only(),
            )),
            weather: Arc::new(WeatherClient::new(None, Duration::from_secs(1)).unwrap()),
        }
    }

    pub(crate) async fn send(
        state: AppState,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(test_state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["records_loaded"], true);
        assert_eq!(body["record_count"], 3);
        assert_eq!(body["weather_configured"], false);
    }

    #[tokio::test]
    async fn test_risk_with_supplied_weather() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "Mumbai",
                    "weather": {"temp": 42, "humidity": 90, "wind_speed": 20}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "Mumbai");
        assert_eq!(body["risk"], "CRITICAL");
        assert_eq!(body["risk_class"], 3);
        assert_eq!(body["model"], "heuristic");
        assert_eq!(body["confidence"], 0.75);
        assert_eq!(body["weather"]["temperature"], 42.0);
    }

    #[tokio::test]
    async fn test_risk_low() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "Mumbai",
                    "weather": {"temperature": 25, "humidity": 60, "wind_speed": 5}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk"], "LOW");
        assert_eq!(body["score"], 0);
        assert_eq!(body["color"], "#4CAF50");
    }

    #[tokio::test]
    async fn test_risk_empty_location_is_bad_request() {
        let (status, body) = send(
            test_state(),
            post_json("/api/v1/risk", serde_json::json!({"location": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("location"));
    }

    #[tokio::test]
    async fn test_risk_without_weather_or_key_is_bad_gateway() {
        let (status, _) = send(
            test_state(),
            post_json("/api/v1/risk", serde_json::json!({"location": "Chennai"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_risk_with_history_attached() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "tamil",
                    "weather": {"temp": 25, "humidity": 60, "wind": 5},
                    "include_history": true
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk"], "LOW");
        assert_eq!(body["location"], "tamil");
        assert_eq!(body["canonical_location"], "Tamil Nadu");
        assert_eq!(body["history"].as_array().unwrap().len(), 2);
        assert!(body.get("history_error").is_none());
    }

    #[tokio::test]
    async fn test_risk_history_miss_keeps_assessment() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "Atlantis",
                    "weather": {"temp": 42, "humidity": 90, "wind": 20},
                    "include_history": true
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk"], "CRITICAL");
        assert!(body.get("history").is_none());
        assert!(body.get("canonical_location").is_none());
        assert!(body["history_error"].as_str().unwrap().contains("Atlantis"));
    }

    #[tokio::test]
    async fn test_risk_history_with_unavailable_store() {
        let state = AppState {
            service: Arc::new(RiskService::new(
                Arc::new(RecordStore::unavailable("records file missing")),
                OverlayChain::heuristic_only(),
            )),
            ..test_state()
        };
        let (status, body) = send(
            state,
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "Goa",
                    "weather": {"temp": 25, "humidity": 60, "wind": 5},
                    "include_history": true
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk"], "LOW");
        assert!(body.get("history").is_none());
        assert!(body["history_error"]
            .as_str()
            .unwrap()
            .contains("records file missing"));
    }

    #[tokio::test]
    async fn test_risk_without_history_flag_omits_history() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/risk",
                serde_json::json!({
                    "location": "tamil",
                    "weather": {"temp": 25, "humidity": 60, "wind": 5},
                    "recent": [{"temp": 24, "humidity": 58, "wind": 4}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("history").is_none());
        assert!(body.get("history_error").is_none());
        assert!(body.get("probabilities").is_none());
    }

    #[tokio::test]
    async fn test_history_fuzzy_match() {
        let (status, body) = send(
            test_state(),
            post_json("/api/v1/history", serde_json::json!({"location": "tamil"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "Tamil Nadu");
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1]["total_deaths"].is_null());
    }

    #[tokio::test]
    async fn test_history_resolved_but_empty() {
        let (status, body) = send(
            test_state(),
            post_json(
                "/api/v1/history",
                serde_json::json!({"location": "uttar pradesh"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "Uttar Pradesh");
        assert!(body["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_not_found_has_hints() {
        let (status, body) = send(
            test_state(),
            post_json("/api/v1/history", serde_json::json!({"location": "Atlantis"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let hints = body["hints"].as_array().unwrap();
        assert!(!hints.is_empty() && hints.len() <= disaster_risk::MAX_HINTS);
    }

    #[tokio::test]
    async fn test_history_store_unavailable() {
        let state = AppState {
            service: Arc::new(RiskService::new(
                Arc::new(RecordStore::unavailable("records file missing")),
                OverlayChain::heuristic_only(),
            )),
            ..test_state()
        };
        let (status, body) = send(
            state.clone(),
            post_json("/api/v1/history", serde_json::json!({"location": "Goa"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("records file missing"));

        let (status, _) = send(state, get("/api/v1/locations")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_list_locations() {
        let (status, body) = send(test_state(), get("/api/v1/locations")).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1]["name"], "Tamil Nadu");
        assert_eq!(list[1]["record_count"], 2);
    }
}
