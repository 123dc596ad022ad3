use std::path::PathBuf;
use std::time::Duration;

use tracing::error;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MODEL_TIMEOUT_SECS: f64 = 8.0;
const DEFAULT_MEMORY_FILE: &str = "long_term_memory.json";

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_url: String,
    /// Gateway credential. `None` is not fatal: calls are expected to fail
    /// and each failure is contained per-frame.
    pub api_key: Option<String>,
    pub model: String,
    /// Hard timeout for the navigation-mode inference call.
    pub model_timeout: Duration,
    /// (width, height) bounds for navigation/task frames.
    pub nav_image_size: (u32, u32),
    /// Tighter square crop bound for micro-guidance frames.
    pub micro_image_size: (u32, u32),
    pub memory_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let api_key = std::env::var("SIGHTLINE_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            error!("SIGHTLINE_API_KEY is not set; perception gateway calls will fail");
        }

        let model_timeout = std::env::var("MODEL_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS);

        Self {
            gateway_url: std::env::var("SIGHTLINE_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            api_key,
            model: std::env::var("SIGHTLINE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            model_timeout: Duration::from_secs_f64(model_timeout),
            nav_image_size: (224, 160),
            micro_image_size: (224, 224),
            memory_path: std::env::var("SIGHTLINE_MEMORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MEMORY_FILE)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            model_timeout: Duration::from_secs_f64(DEFAULT_MODEL_TIMEOUT_SECS),
            nav_image_size: (224, 160),
            micro_image_size: (224, 224),
            memory_path: PathBuf::from(DEFAULT_MEMORY_FILE),
        }
    }
}
