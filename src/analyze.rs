//! Analysis pipeline: gather reviews and comments, score them in one batch,
//! merge, and summarize.
//!
//! TMDB is the primary source and its failures abort the request; YouTube is
//! enrichment and its failures only shrink the data set. Nothing is cached on
//! a failure path, so a scorer outage never poisons the cache.

use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::ApiError;
use crate::sentiment::SentimentScore;
use crate::text::{is_likely_english, trim_text};
use crate::youtube::CommentOutcome;

pub const SOURCE_TMDB: &str = "TMDB";
pub const SOURCE_YOUTUBE: &str = "YouTube";

/// Comments need less text than reviews to qualify, but not none.
const MIN_COMMENT_CHARS: usize = 40;
/// Zero-like comments are mostly spam and emoji noise.
const MIN_COMMENT_LIKES: i64 = 1;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoredReview {
    pub source: String,
    pub author: String,
    pub content: String,
    pub sentiment: String,
    pub confidence: f64,
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive_percent: f64,
    pub negative_percent: f64,
    pub neutral_percent: f64,
}

/// The "no data" payload historically serialized `stats` as `{}` rather than
/// a zeroed block, and the UI relies on that.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisStats {
    Empty {},
    Computed(Stats),
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceCounts {
    pub tmdb_count: usize,
    pub youtube_count: usize,
    pub youtube_video_id: Option<String>,
    pub youtube_query: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub source: String,
    pub total_reviews: usize,
    pub summary: String,
    #[schema(value_type = Stats)]
    pub stats: AnalysisStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<SourceCounts>,
    pub reviews: Vec<ScoredReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_reviews: Option<Vec<ScoredReview>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_comments: Option<Vec<ScoredReview>>,
}

impl AnalysisResult {
    fn no_data(source: &str) -> Self {
        AnalysisResult {
            source: source.to_string(),
            total_reviews: 0,
            summary: "no data".to_string(),
            stats: AnalysisStats::Empty {},
            sources: None,
            reviews: Vec::new(),
            tmdb_reviews: None,
            youtube_comments: None,
        }
    }
}

/// A quality-filtered item awaiting scoring.
struct Candidate {
    source: &'static str,
    author: String,
    content: String,
    like_count: i64,
}

#[derive(Default)]
struct LabelCounts {
    positive: usize,
    negative: usize,
    neutral: usize,
}

/// Full analysis for one movie: cache check, concurrent gather, filter,
/// batch score, merge, summarize, cache write.
pub async fn analyze_movie(state: &AppState, movie_id: &str) -> Result<AnalysisResult, ApiError> {
    let cache_key = format!("movie:{movie_id}");
    if let Some(cached) = state.cache.get(&cache_key) {
        tracing::debug!(%movie_id, "analysis cache hit");
        return Ok(cached);
    }

    // Reviews and (title -> comments) run concurrently; a TMDB failure on
    // either side fails the join immediately.
    let (reviews, outcome) = tokio::try_join!(
        state.tmdb.fetch_reviews(movie_id),
        async {
            let title = state.tmdb.fetch_title(movie_id).await?;
            Ok::<_, anyhow::Error>(state.youtube.gather_for_title(&title).await)
        }
    )
    .map_err(|err| ApiError::internal("Analyze failed", err))?;

    let (comments, video_id, query) = match outcome {
        CommentOutcome::Harvested {
            comments,
            video_id,
            query,
        } => (comments, video_id, Some(query)),
        CommentOutcome::Degraded { reason } => {
            tracing::warn!(%movie_id, reason = %reason, "comment enrichment degraded");
            (Vec::new(), None, None)
        }
    };

    let source = if comments.is_empty() {
        SOURCE_TMDB.to_string()
    } else {
        format!("{SOURCE_TMDB}+{SOURCE_YOUTUBE}")
    };

    if reviews.is_empty() && comments.is_empty() {
        let empty = AnalysisResult::no_data(&source);
        state.cache.put(cache_key, empty.clone());
        return Ok(empty);
    }

    let max_chars = state.config.analysis_max_chars;

    let tmdb_items: Vec<Candidate> = reviews
        .into_iter()
        .map(|r| Candidate {
            source: SOURCE_TMDB,
            author: r.author,
            content: trim_text(&r.content, max_chars),
            like_count: 0,
        })
        .filter(|c| is_likely_english(&c.content))
        .collect();

    let youtube_items: Vec<Candidate> = comments
        .into_iter()
        .map(|c| Candidate {
            source: SOURCE_YOUTUBE,
            author: c.author,
            content: trim_text(&c.text, max_chars),
            like_count: c.like_count,
        })
        .filter(|c| is_likely_english(&c.content))
        .filter(|c| c.content.chars().count() >= MIN_COMMENT_CHARS)
        .filter(|c| c.like_count >= MIN_COMMENT_LIKES)
        .collect();

    let tmdb_count = tmdb_items.len();
    let youtube_count = youtube_items.len();

    let mut batch = tmdb_items;
    batch.extend(youtube_items);
    batch.truncate(state.config.analysis_max_items);

    if batch.is_empty() {
        let empty = AnalysisResult::no_data(&source);
        state.cache.put(cache_key, empty.clone());
        return Ok(empty);
    }

    let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
    // ScoreError maps to 502 at the boundary; nothing below caches it.
    let scores = state.sentiment.score(&texts).await?;

    let (merged, counts) = merge_scores(batch, scores);
    let stats = Stats::from_counts(&counts);
    let summary = summarize(&stats);
    let (tmdb_view, youtube_view) = split_views(&merged);

    let payload = AnalysisResult {
        source,
        total_reviews: merged.len(),
        summary: summary.to_string(),
        stats: AnalysisStats::Computed(stats),
        sources: Some(SourceCounts {
            tmdb_count,
            youtube_count,
            youtube_video_id: video_id,
            youtube_query: query,
        }),
        reviews: merged,
        tmdb_reviews: Some(tmdb_view),
        youtube_comments: Some(youtube_view),
    };

    state.cache.put(cache_key, payload.clone());
    Ok(payload)
}

/// Attach labels and tally counts. Callers guarantee `scores` matches
/// `items` in length and order (enforced by the sentiment client).
fn merge_scores(
    items: Vec<Candidate>,
    scores: Vec<SentimentScore>,
) -> (Vec<ScoredReview>, LabelCounts) {
    let mut counts = LabelCounts::default();

    let merged = items
        .into_iter()
        .zip(scores)
        .map(|(item, score)| {
            let sentiment = score.label.to_lowercase();
            match sentiment.as_str() {
                "positive" => counts.positive += 1,
                "negative" => counts.negative += 1,
                _ => counts.neutral += 1,
            }
            ScoredReview {
                source: item.source.to_string(),
                author: item.author,
                content: item.content,
                sentiment,
                confidence: score.confidence,
                like_count: item.like_count,
            }
        })
        .collect();

    (merged, counts)
}

impl Stats {
    fn from_counts(counts: &LabelCounts) -> Self {
        let total = counts.positive + counts.negative + counts.neutral;
        Stats {
            positive: counts.positive,
            negative: counts.negative,
            neutral: counts.neutral,
            positive_percent: percent(counts.positive, total),
            negative_percent: percent(counts.negative, total),
            neutral_percent: percent(counts.neutral, total),
        }
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Summary label: strict majority wins, ties fall to "mixed", then the 60%
/// thresholds override (positive checked first, negative second). The order
/// matches long-observed behavior.
fn summarize(stats: &Stats) -> &'static str {
    let mut summary = "mixed";

    if stats.positive > stats.negative && stats.positive > stats.neutral {
        summary = "positive";
    }
    if stats.negative > stats.positive && stats.negative > stats.neutral {
        summary = "negative";
    }
    if stats.neutral > stats.positive && stats.neutral > stats.negative {
        summary = "neutral";
    }

    if stats.positive_percent >= 60.0 {
        summary = "positive";
    } else if stats.negative_percent >= 60.0 {
        summary = "negative";
    }

    summary
}

/// Per-source presentation views: TMDB by length, YouTube by likes then
/// length, both descending.
fn split_views(merged: &[ScoredReview]) -> (Vec<ScoredReview>, Vec<ScoredReview>) {
    let char_len = |r: &ScoredReview| r.content.chars().count();

    let mut tmdb: Vec<ScoredReview> = merged
        .iter()
        .filter(|r| r.source == SOURCE_TMDB)
        .cloned()
        .collect();
    tmdb.sort_by(|a, b| char_len(b).cmp(&char_len(a)));

    let mut youtube: Vec<ScoredReview> = merged
        .iter()
        .filter(|r| r.source == SOURCE_YOUTUBE)
        .cloned()
        .collect();
    youtube.sort_by(|a, b| {
        b.like_count
            .cmp(&a.like_count)
            .then(char_len(b).cmp(&char_len(a)))
    });

    (tmdb, youtube)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(source: &'static str, content: &str, likes: i64) -> Candidate {
        Candidate {
            source,
            author: "a".to_string(),
            content: content.to_string(),
            like_count: likes,
        }
    }

    fn score(label: &str, confidence: f64) -> SentimentScore {
        SentimentScore {
            label: label.to_string(),
            confidence,
            probabilities: None,
        }
    }

    #[test]
    fn test_merge_lowercases_labels_and_tallies() {
        let items = vec![
            candidate(SOURCE_TMDB, "great", 0),
            candidate(SOURCE_TMDB, "bad", 0),
            candidate(SOURCE_YOUTUBE, "meh", 3),
        ];
        let scores = vec![
            score("Positive", 0.9),
            score("NEGATIVE", 0.8),
            score("neutral", 0.5),
        ];

        let (merged, counts) = merge_scores(items, scores);
        assert_eq!(merged[0].sentiment, "positive");
        assert_eq!(merged[1].sentiment, "negative");
        assert_eq!(counts.positive, 1);
        assert_eq!(counts.negative, 1);
        assert_eq!(counts.neutral, 1);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_counts_sum_to_total_and_percents_to_100() {
        let counts = LabelCounts {
            positive: 1,
            negative: 1,
            neutral: 1,
        };
        let stats = Stats::from_counts(&counts);
        assert_eq!(stats.positive + stats.negative + stats.neutral, 3);

        let sum = stats.positive_percent + stats.negative_percent + stats.neutral_percent;
        assert!((sum - 100.0).abs() <= 0.02, "sum was {sum}");
        // Two-decimal rounding.
        assert_eq!(stats.positive_percent, 33.33);
    }

    #[test]
    fn test_summary_majority_and_ties() {
        let majority = Stats::from_counts(&LabelCounts {
            positive: 2,
            negative: 5,
            neutral: 3,
        });
        assert_eq!(summarize(&majority), "negative");

        let tie = Stats::from_counts(&LabelCounts {
            positive: 4,
            negative: 4,
            neutral: 2,
        });
        assert_eq!(summarize(&tie), "mixed");
    }

    #[test]
    fn test_summary_threshold_overrides_majority() {
        // Positive at exactly 60%: the threshold rule fires.
        let stats = Stats::from_counts(&LabelCounts {
            positive: 6,
            negative: 1,
            neutral: 3,
        });
        assert_eq!(stats.positive_percent, 60.0);
        assert_eq!(summarize(&stats), "positive");

        let negative_heavy = Stats::from_counts(&LabelCounts {
            positive: 1,
            negative: 7,
            neutral: 2,
        });
        assert_eq!(summarize(&negative_heavy), "negative");
    }

    #[test]
    fn test_summary_positive_override_checked_before_negative() {
        // Percent fields forced directly: with both thresholds met, the
        // else-if chain resolves positive first.
        let stats = Stats {
            positive: 0,
            negative: 0,
            neutral: 0,
            positive_percent: 60.0,
            negative_percent: 60.0,
            neutral_percent: 0.0,
        };
        assert_eq!(summarize(&stats), "positive");
    }

    #[test]
    fn test_split_views_sorting() {
        let merged = vec![
            ScoredReview {
                source: SOURCE_TMDB.to_string(),
                author: "a".into(),
                content: "short".into(),
                sentiment: "positive".into(),
                confidence: 0.9,
                like_count: 0,
            },
            ScoredReview {
                source: SOURCE_TMDB.to_string(),
                author: "b".into(),
                content: "a much longer review body".into(),
                sentiment: "negative".into(),
                confidence: 0.8,
                like_count: 0,
            },
            ScoredReview {
                source: SOURCE_YOUTUBE.to_string(),
                author: "c".into(),
                content: "liked comment".into(),
                sentiment: "neutral".into(),
                confidence: 0.5,
                like_count: 10,
            },
            ScoredReview {
                source: SOURCE_YOUTUBE.to_string(),
                author: "d".into(),
                content: "equally liked but a longer comment".into(),
                sentiment: "neutral".into(),
                confidence: 0.5,
                like_count: 10,
            },
        ];

        let (tmdb, youtube) = split_views(&merged);
        assert_eq!(tmdb[0].author, "b");
        assert_eq!(tmdb[1].author, "a");
        // Same like count: longer content wins.
        assert_eq!(youtube[0].author, "d");
        assert_eq!(youtube[1].author, "c");
    }

    #[test]
    fn test_no_data_payload_exact_shape() {
        let value = serde_json::to_value(AnalysisResult::no_data("TMDB")).unwrap();
        assert_eq!(
            value,
            json!({
                "source": "TMDB",
                "totalReviews": 0,
                "summary": "no data",
                "stats": {},
                "reviews": []
            })
        );
    }

    // ------------------------------------------------------------------
    // Full-pipeline tests against local stand-ins for TMDB and the scorer.
    // ------------------------------------------------------------------

    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::routing::{get, post};
    use axum::{Json, Router};

    use crate::cache::TtlCache;
    use crate::config::Config;
    use crate::sentiment::{ModelMetaClient, SentimentClient};
    use crate::tmdb::TmdbClient;
    use crate::youtube::YoutubeClient;

    const REVIEW_ONE: &str = "This film was a delight from start to finish, with sharp writing and confident direction throughout.";
    const REVIEW_TWO: &str = "The pacing drags badly in the middle act and the ending never earns the emotion it reaches for.";

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn test_state(addr: SocketAddr) -> AppState {
        let base = format!("http://{addr}");
        let http = reqwest::Client::new();
        let config = Config {
            port: 0,
            tmdb_api_key: Some("test-key".to_string()),
            youtube_api_key: None,
            sentiment_url: format!("{base}/predict_batch"),
            analysis_ttl: Duration::from_secs(60),
            analysis_max_items: 200,
            analysis_max_chars: 500,
            model_meta_ttl: Duration::from_secs(60),
        };
        AppState {
            tmdb: TmdbClient::with_base_url(
                http.clone(),
                Some("test-key".to_string()),
                base.clone(),
            ),
            youtube: YoutubeClient::new(http.clone(), None),
            sentiment: SentimentClient::new(http.clone(), config.sentiment_url.clone()),
            model_meta: ModelMetaClient::new(http.clone(), base, config.model_meta_ttl),
            cache: TtlCache::new(config.analysis_ttl),
            config,
        }
    }

    fn review_page() -> serde_json::Value {
        json!({
            "results": [
                { "author": "a", "content": REVIEW_ONE },
                { "author": "b", "content": REVIEW_TWO }
            ],
            "total_pages": 1
        })
    }

    #[tokio::test]
    async fn test_cached_analysis_skips_upstream_and_scorer() {
        let review_calls = Arc::new(AtomicUsize::new(0));
        let score_calls = Arc::new(AtomicUsize::new(0));

        let rc = review_calls.clone();
        let sc = score_calls.clone();
        let router = Router::new()
            .route(
                "/movie/:id/reviews",
                get(move || async move {
                    rc.fetch_add(1, Ordering::SeqCst);
                    Json(review_page())
                }),
            )
            .route(
                "/movie/:id",
                get(|| async { Json(json!({ "title": "Test Movie" })) }),
            )
            .route(
                "/predict_batch",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    sc.fetch_add(1, Ordering::SeqCst);
                    let n = body["texts"].as_array().map_or(0, |texts| texts.len());
                    let scores: Vec<serde_json::Value> = (0..n)
                        .map(|_| json!({ "label": "positive", "confidence": 0.9 }))
                        .collect();
                    Json(json!(scores))
                }),
            );

        let state = test_state(spawn(router).await);

        let first = analyze_movie(&state, "101").await.unwrap();
        let second = analyze_movie(&state, "101").await.unwrap();

        // The second call is served from cache without touching upstream.
        assert_eq!(review_calls.load(Ordering::SeqCst), 1);
        assert_eq!(score_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        assert_eq!(first.total_reviews, 2);
        assert_eq!(first.summary, "positive");
    }

    #[tokio::test]
    async fn test_scorer_length_mismatch_errors_and_is_never_cached() {
        let review_calls = Arc::new(AtomicUsize::new(0));
        let rc = review_calls.clone();
        let router = Router::new()
            .route(
                "/movie/:id/reviews",
                get(move || async move {
                    rc.fetch_add(1, Ordering::SeqCst);
                    Json(review_page())
                }),
            )
            .route(
                "/movie/:id",
                get(|| async { Json(json!({ "title": "Test Movie" })) }),
            )
            .route(
                "/predict_batch",
                // One result for two texts.
                post(|| async { Json(json!([{ "label": "positive", "confidence": 0.9 }])) }),
            );

        let state = test_state(spawn(router).await);

        let err = analyze_movie(&state, "202").await.unwrap_err();
        assert!(matches!(err, ApiError::ScoringUnavailable(_)));
        assert!(state.cache.get("movie:202").is_none());

        // Nothing was cached, so a retry goes upstream again.
        let err = analyze_movie(&state, "202").await.unwrap_err();
        assert!(matches!(err, ApiError::ScoringUnavailable(_)));
        assert_eq!(review_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_sources_cache_no_data_without_scoring() {
        let review_calls = Arc::new(AtomicUsize::new(0));
        let score_calls = Arc::new(AtomicUsize::new(0));

        let rc = review_calls.clone();
        let sc = score_calls.clone();
        let router = Router::new()
            .route(
                "/movie/:id/reviews",
                get(move || async move {
                    rc.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "results": [], "total_pages": 1 }))
                }),
            )
            .route(
                "/movie/:id",
                get(|| async { Json(json!({ "title": "Obscure Movie" })) }),
            )
            .route(
                "/predict_batch",
                post(move || async move {
                    sc.fetch_add(1, Ordering::SeqCst);
                    Json(json!([]))
                }),
            );

        let state = test_state(spawn(router).await);

        let first = analyze_movie(&state, "303").await.unwrap();
        assert_eq!(first.summary, "no data");
        let second = analyze_movie(&state, "303").await.unwrap();
        assert_eq!(second.summary, "no data");

        // The empty result is itself cached, and the scorer is never called.
        assert_eq!(review_calls.load(Ordering::SeqCst), 1);
        assert_eq!(score_calls.load(Ordering::SeqCst), 0);
    }
}
