//! HTTP handlers and shared application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::analyze::{self, AnalysisResult};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::ApiError;
use crate::sentiment::{ModelMetaClient, SentimentClient};
use crate::text::trim_text;
use crate::tmdb::{RandomReview, TmdbClient};
use crate::youtube::YoutubeClient;

/// Page-draw budget for the random sampler.
const MAX_SAMPLE_ATTEMPTS: u32 = 8;

pub struct AppState {
    pub config: Config,
    pub tmdb: TmdbClient,
    pub youtube: YoutubeClient,
    pub sentiment: SentimentClient,
    pub model_meta: ModelMetaClient,
    pub cache: TtlCache<AnalysisResult>,
}

/// Aggregate review sentiment for one movie
#[utoipa::path(
    get,
    path = "/analyze/{movie_id}",
    params(("movie_id" = String, Path, description = "TMDB movie id")),
    responses(
        (status = 200, description = "Aggregated sentiment analysis", body = AnalysisResult),
        (status = 400, description = "Missing TMDB credential"),
        (status = 502, description = "Sentiment service unavailable"),
        (status = 500, description = "Analyze failed"),
    ),
    tag = "analysis"
)]
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    if state.config.tmdb_api_key.is_none() {
        return Err(ApiError::MissingCredential("TMDB_API_KEY"));
    }
    let result = analyze::analyze_movie(&state, &movie_id).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SentimentTestRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SingleTestResult {
    pub text: String,
    pub label: String,
    pub probabilities: Option<HashMap<String, f64>>,
    pub confidence: f64,
    pub latency_ms: u64,
    pub model_version: String,
    pub model_loaded: Option<bool>,
}

/// Score a single piece of text against the live model
#[utoipa::path(
    post,
    path = "/sentiment/test",
    request_body = SentimentTestRequest,
    responses(
        (status = 200, description = "Scored text with model metadata", body = SingleTestResult),
        (status = 400, description = "Missing text"),
        (status = 502, description = "Sentiment service unavailable"),
        (status = 500, description = "Sentiment test failed"),
    ),
    tag = "sentiment"
)]
pub async fn test_sentiment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SentimentTestRequest>,
) -> Result<Json<SingleTestResult>, ApiError> {
    let text = request.text.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Err(ApiError::MissingText);
    }

    let started = Instant::now();
    let scores = state
        .sentiment
        .score(&[trim_text(&text, state.config.analysis_max_chars)])
        .await?;
    let meta = state.model_meta.get().await;

    // score() guarantees one result per input.
    let first = scores
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal("Sentiment test failed", anyhow!("no score returned")))?;

    Ok(Json(SingleTestResult {
        text,
        label: first.label,
        probabilities: first.probabilities,
        confidence: first.confidence,
        latency_ms: started.elapsed().as_millis() as u64,
        model_version: meta.model_version,
        model_loaded: meta.model_loaded,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RandomQuery {
    /// Number of reviews to sample, clamped to 3..=5.
    pub count: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RandomReviewsResponse {
    pub count: usize,
    pub reviews: Vec<RandomReview>,
}

/// Sample random reviews from currently popular movies
#[utoipa::path(
    get,
    path = "/reviews/random",
    params(RandomQuery),
    responses(
        (status = 200, description = "Random qualifying reviews", body = RandomReviewsResponse),
        (status = 500, description = "Missing credential or provider failure"),
    ),
    tag = "reviews"
)]
pub async fn get_random_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RandomQuery>,
) -> Result<Json<RandomReviewsResponse>, ApiError> {
    if state.config.tmdb_api_key.is_none() {
        return Err(ApiError::internal(
            "Missing TMDB_API_KEY",
            anyhow!("TMDB_API_KEY not configured"),
        ));
    }

    let count = clamp_count(query.count.as_deref());
    let reviews = state
        .tmdb
        .sample_random_reviews(count, MAX_SAMPLE_ATTEMPTS)
        .await
        .map_err(|err| ApiError::internal("Random reviews failed", err))?;

    Ok(Json(RandomReviewsResponse {
        count: reviews.len(),
        reviews,
    }))
}

/// Lenient count parsing: junk falls back to the default of 5, then the
/// value is clamped into [3, 5].
fn clamp_count(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(5)
        .clamp(3, 5) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_count_bounds() {
        assert_eq!(clamp_count(None), 5);
        assert_eq!(clamp_count(Some("4")), 4);
        assert_eq!(clamp_count(Some("2")), 3);
        assert_eq!(clamp_count(Some("0")), 3);
        assert_eq!(clamp_count(Some("99")), 5);
        assert_eq!(clamp_count(Some("-1")), 3);
        assert_eq!(clamp_count(Some("abc")), 5);
    }
}
