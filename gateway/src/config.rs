//! Gateway configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "models";
pub const DEFAULT_OVERLAYS: &str = "boosted,forest";
pub const DEFAULT_WEATHER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "disaster_gateway=debug,disaster_risk=info,info";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Overlay priority, highest first
    pub overlays: Vec<String>,
    pub weather_api_key: Option<String>,
    pub weather_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            overlays: split_list(DEFAULT_OVERLAYS),
            weather_api_key: None,
            weather_timeout: Duration::from_secs(DEFAULT_WEATHER_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = lookup("RISK_GATEWAY_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|p| match p.trim().parse() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("Ignoring invalid port {:?}", p);
                    None
                }
            })
            .unwrap_or(defaults.port);

        let data_dir = lookup("RISK_DATA_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let overlays = lookup("RISK_OVERLAYS")
            .map(|o| split_list(&o))
            .unwrap_or(defaults.overlays);

        let weather_api_key = lookup("WEATHER_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let weather_timeout = lookup("WEATHER_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.weather_timeout);

        Self {
            port,
            data_dir,
            overlays,
            weather_api_key,
            weather_timeout,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
