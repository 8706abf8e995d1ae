//! Service configuration, read from the environment once at startup and
//! passed to each component. Nothing reads env vars mid-request.

use std::env;
use std::time::Duration;

const DEFAULT_SENTIMENT_URL: &str = "http://localhost:8000/predict_batch";
const DEFAULT_ANALYSIS_TTL_MS: u64 = 30 * 60 * 1000;
const DEFAULT_MODEL_META_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_MAX_ITEMS: usize = 200;
const DEFAULT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// TMDB credential. Optional at boot; endpoints that need it reject
    /// requests when it is absent.
    pub tmdb_api_key: Option<String>,
    /// YouTube credential. Optional; comment enrichment is skipped without it.
    pub youtube_api_key: Option<String>,
    /// Sentiment scorer endpoint. A path containing `predict_batch` (or
    /// ending in `/predict/batch`) selects the batch protocol.
    pub sentiment_url: String,
    pub analysis_ttl: Duration,
    pub analysis_max_items: usize,
    pub analysis_max_chars: usize,
    pub model_meta_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),
            tmdb_api_key: non_empty_var("TMDB_API_KEY"),
            youtube_api_key: non_empty_var("YOUTUBE_API_KEY"),
            sentiment_url: env::var("SENTIMENT_API_URL")
                .unwrap_or_else(|_| DEFAULT_SENTIMENT_URL.to_string()),
            analysis_ttl: Duration::from_millis(parse_or(
                "ANALYSIS_TTL_MS",
                DEFAULT_ANALYSIS_TTL_MS,
            )),
            analysis_max_items: parse_or("ANALYSIS_MAX_ITEMS", DEFAULT_MAX_ITEMS),
            analysis_max_chars: parse_or("ANALYSIS_MAX_CHARS", DEFAULT_MAX_CHARS),
            model_meta_ttl: Duration::from_millis(parse_or(
                "MODEL_META_TTL_MS",
                DEFAULT_MODEL_META_TTL_MS,
            )),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a numeric env var, falling back to the default on absence or junk.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
