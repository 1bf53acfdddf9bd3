use anyhow::Result;
use disaster_risk::RiskService;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;
mod weather;
mod weather_routes;

use config::{GatewayConfig, DEFAULT_LOG_FILTER};
use routes::AppState;
use weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();

    let service = RiskService::from_data_dir(&config.data_dir, &config.overlays);
    match service.store().unavailable_reason() {
        None => tracing::info!(
            "   Loaded {} historical records from {}",
            service.store().len(),
            config.data_dir.display()
        ),
        Some(reason) => tracing::warn!("   Historical records unavailable: {}", reason),
    }
    let ready = service.overlays().warm_up();
    tracing::info!(
        "   Overlays ready: {}/{} {:?}",
        ready,
        service.overlays().len(),
        service.overlays().names()
    );

    let weather = WeatherClient::new(config.weather_api_key.clone(), config.weather_timeout)?;
    if !weather.is_configured() {
        tracing::warn!("   WEATHER_API_KEY not set - requests must supply weather");
    }

    let state = AppState {
        service: Arc::new(service),
        weather: Arc::new(weather),
    };

    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    tracing::info!("Disaster gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
