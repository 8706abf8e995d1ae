//! Client for the external sentiment scoring service.
//!
//! The service is deployed in two flavors: a batch endpoint accepting
//! `{texts: [...]}` and an older single-item endpoint accepting `{text}`.
//! The configured URL decides the protocol; either way the caller sees one
//! canonical `SentimentScore` shape, normalized once at this boundary.
//!
//! Scoring failures are never retried here. The caller decides whether to
//! degrade or fail, so every failure mode is a distinguishable `ScoreError`.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::cache::TtlCache;

/// Generous budget: transformer inference on cold models is slow.
const SCORE_TIMEOUT: Duration = Duration::from_secs(60);
/// Health probes must never hold up a response for long.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("sentiment request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sentiment service returned status {0}")]
    Status(u16),

    #[error("sentiment service returned no results")]
    Empty,

    #[error("sentiment results length mismatch: sent {sent}, got {got}")]
    Mismatch { sent: usize, got: usize },
}

/// Canonical per-text result, same for both protocols.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentScore {
    pub label: String,
    pub confidence: f64,
    pub probabilities: Option<HashMap<String, f64>>,
}

/// Union of the field spellings the two scorer deployments emit.
#[derive(Debug, Deserialize)]
struct RawScore {
    label: Option<String>,
    sentiment: Option<String>,
    confidence: Option<f64>,
    max_prob: Option<f64>,
    probabilities: Option<HashMap<String, f64>>,
    probs: Option<HashMap<String, f64>>,
}

impl RawScore {
    fn normalize(self) -> SentimentScore {
        SentimentScore {
            label: self
                .label
                .or(self.sentiment)
                .unwrap_or_else(|| "neutral".to_string()),
            confidence: self.confidence.or(self.max_prob).unwrap_or(0.0),
            probabilities: self.probabilities.or(self.probs),
        }
    }
}

/// Batch responses arrive either bare or wrapped in `{results: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchPayload {
    Bare(Vec<RawScore>),
    Wrapped { results: Vec<RawScore> },
}

impl BatchPayload {
    fn into_scores(self) -> Vec<SentimentScore> {
        let raw = match self {
            BatchPayload::Bare(raw) => raw,
            BatchPayload::Wrapped { results } => results,
        };
        raw.into_iter().map(RawScore::normalize).collect()
    }
}

pub struct SentimentClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SentimentClient {
    pub fn new(http: reqwest::Client, endpoint: String) -> Self {
        SentimentClient { http, endpoint }
    }

    fn is_batch_endpoint(&self) -> bool {
        let url = self.endpoint.to_lowercase();
        url.contains("predict_batch") || url.ends_with("/predict/batch")
    }

    /// Endpoint with the predict suffix stripped; the health probe lives at
    /// `{base}/health`.
    pub fn base_url(&self) -> String {
        let mut base = self.endpoint.as_str();
        for suffix in ["/predict_batch", "/predict/batch", "/predict"] {
            base = strip_suffix_ci(base, suffix);
        }
        base.to_string()
    }

    /// Score `texts`, returning one result per input in input order.
    pub async fn score(&self, texts: &[String]) -> Result<Vec<SentimentScore>, ScoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let scores = if self.is_batch_endpoint() {
            self.score_batch(texts).await?
        } else {
            // One request per text, concurrently; try_join_all keeps results
            // index-correlated with the inputs regardless of arrival order.
            try_join_all(texts.iter().map(|text| self.score_one(text))).await?
        };

        ensure_counts(texts.len(), scores)
    }

    async fn score_batch(&self, texts: &[String]) -> Result<Vec<SentimentScore>, ScoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(SCORE_TIMEOUT)
            .json(&json!({ "texts": texts }))
            .send()
            .await?;
        let response = check_status(response)?;
        let payload: BatchPayload = response.json().await?;
        Ok(payload.into_scores())
    }

    async fn score_one(&self, text: &str) -> Result<SentimentScore, ScoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(SCORE_TIMEOUT)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let response = check_status(response)?;
        let raw: RawScore = response.json().await?;
        Ok(raw.normalize())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ScoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ScoreError::Status(status.as_u16()))
    }
}

/// Empty or wrong-length result sets indicate a degraded scorer; both are
/// hard failures, never silently truncated or padded.
fn ensure_counts(
    sent: usize,
    scores: Vec<SentimentScore>,
) -> Result<Vec<SentimentScore>, ScoreError> {
    if scores.is_empty() {
        return Err(ScoreError::Empty);
    }
    if scores.len() != sent {
        return Err(ScoreError::Mismatch {
            sent,
            got: scores.len(),
        });
    }
    Ok(scores)
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> &'a str {
    if s.len() < suffix.len() {
        return s;
    }
    let split = s.len() - suffix.len();
    if s.is_char_boundary(split) && s[split..].eq_ignore_ascii_case(suffix) {
        &s[..split]
    } else {
        s
    }
}

// ============================================================================
// Model metadata (health probe)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub model_version: String,
    pub model_loaded: Option<bool>,
}

impl ModelMeta {
    fn unknown() -> Self {
        ModelMeta {
            model_version: "unknown".to_string(),
            model_loaded: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthPayload {
    version: Option<String>,
    model_source: Option<String>,
    model_dir: Option<String>,
    model_loaded: Option<bool>,
}

/// Polls the scorer's `/health` endpoint with a short TTL cache. Purely
/// informational: upstream failure yields an "unknown" placeholder rather
/// than an error, and failures are never cached.
pub struct ModelMetaClient {
    http: reqwest::Client,
    base_url: String,
    cache: TtlCache<ModelMeta>,
}

const META_CACHE_KEY: &str = "model-meta";

impl ModelMetaClient {
    pub fn new(http: reqwest::Client, base_url: String, ttl: Duration) -> Self {
        ModelMetaClient {
            http,
            base_url,
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn get(&self) -> ModelMeta {
        if let Some(meta) = self.cache.get(META_CACHE_KEY) {
            return meta;
        }

        match self.fetch().await {
            Ok(meta) => {
                self.cache.put(META_CACHE_KEY, meta.clone());
                meta
            }
            Err(err) => {
                tracing::warn!(error = %err, "model health probe failed");
                ModelMeta::unknown()
            }
        }
    }

    async fn fetch(&self) -> Result<ModelMeta, reqwest::Error> {
        let url = format!("{}/health", self.base_url);
        let payload: HealthPayload = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ModelMeta {
            model_version: payload
                .version
                .or(payload.model_source)
                .or(payload.model_dir)
                .unwrap_or_else(|| "unknown".to_string()),
            model_loaded: payload.model_loaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> SentimentClient {
        SentimentClient::new(reqwest::Client::new(), endpoint.to_string())
    }

    #[test]
    fn test_batch_endpoint_detection() {
        assert!(client("https://scorer.example.com/predict_batch").is_batch_endpoint());
        assert!(client("https://scorer.example.com/predict/batch").is_batch_endpoint());
        assert!(client("https://scorer.example.com/PREDICT_BATCH").is_batch_endpoint());
        assert!(!client("https://scorer.example.com/predict").is_batch_endpoint());
    }

    #[test]
    fn test_base_url_strips_predict_suffixes() {
        assert_eq!(
            client("https://s.example.com/predict_batch").base_url(),
            "https://s.example.com"
        );
        assert_eq!(
            client("https://s.example.com/predict/batch").base_url(),
            "https://s.example.com"
        );
        assert_eq!(
            client("https://s.example.com/predict").base_url(),
            "https://s.example.com"
        );
        assert_eq!(
            client("https://s.example.com/score").base_url(),
            "https://s.example.com/score"
        );
    }

    #[test]
    fn test_normalize_prefers_primary_field_names() {
        let raw: RawScore = serde_json::from_value(serde_json::json!({
            "label": "positive",
            "confidence": 0.91,
            "probabilities": { "positive": 0.91, "negative": 0.05 }
        }))
        .unwrap();
        let score = raw.normalize();
        assert_eq!(score.label, "positive");
        assert_eq!(score.confidence, 0.91);
        assert!(score.probabilities.is_some());
    }

    #[test]
    fn test_normalize_accepts_legacy_aliases() {
        let raw: RawScore = serde_json::from_value(serde_json::json!({
            "sentiment": "negative",
            "max_prob": 0.77,
            "probs": { "negative": 0.77 }
        }))
        .unwrap();
        let score = raw.normalize();
        assert_eq!(score.label, "negative");
        assert_eq!(score.confidence, 0.77);
        assert_eq!(score.probabilities.unwrap().get("negative"), Some(&0.77));
    }

    #[test]
    fn test_normalize_defaults_for_missing_fields() {
        let raw: RawScore = serde_json::from_value(serde_json::json!({})).unwrap();
        let score = raw.normalize();
        assert_eq!(score.label, "neutral");
        assert_eq!(score.confidence, 0.0);
        assert!(score.probabilities.is_none());
    }

    #[test]
    fn test_batch_payload_bare_and_wrapped() {
        let bare: BatchPayload =
            serde_json::from_value(serde_json::json!([{ "label": "positive" }])).unwrap();
        assert_eq!(bare.into_scores().len(), 1);

        let wrapped: BatchPayload = serde_json::from_value(serde_json::json!({
            "results": [{ "label": "positive" }, { "label": "negative" }]
        }))
        .unwrap();
        assert_eq!(wrapped.into_scores().len(), 2);
    }

    #[test]
    fn test_ensure_counts_rejects_empty_and_mismatch() {
        assert!(matches!(ensure_counts(3, vec![]), Err(ScoreError::Empty)));

        let three: Vec<SentimentScore> = (0..3)
            .map(|_| SentimentScore {
                label: "neutral".to_string(),
                confidence: 0.5,
                probabilities: None,
            })
            .collect();
        assert!(matches!(
            ensure_counts(5, three.clone()),
            Err(ScoreError::Mismatch { sent: 5, got: 3 })
        ));
        assert_eq!(ensure_counts(3, three).unwrap().len(), 3);
    }
}
