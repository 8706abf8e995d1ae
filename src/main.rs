mod analyze;
mod api;
mod cache;
mod config;
mod error;
mod sentiment;
mod text;
mod tmdb;
mod youtube;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use dotenv::dotenv;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::sentiment::{ModelMetaClient, SentimentClient};
use crate::tmdb::TmdbClient;
use crate::youtube::YoutubeClient;

#[derive(OpenApi)]
#[openapi(
    paths(api::get_analysis, api::test_sentiment, api::get_random_reviews),
    components(
        schemas(
            analyze::AnalysisResult,
            analyze::ScoredReview,
            analyze::Stats,
            analyze::SourceCounts,
            api::SentimentTestRequest,
            api::SingleTestResult,
            api::RandomReviewsResponse,
            tmdb::RandomReview
        )
    ),
    tags(
        (name = "analysis", description = "Aggregated review sentiment"),
        (name = "sentiment", description = "Direct model testing"),
        (name = "reviews", description = "Raw review sampling")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    if config.tmdb_api_key.is_none() {
        tracing::warn!("TMDB_API_KEY not set; analysis endpoints will reject requests");
    }
    if config.youtube_api_key.is_none() {
        tracing::info!("YOUTUBE_API_KEY not set; comment enrichment disabled");
    }

    let http = reqwest::Client::new();
    let sentiment = SentimentClient::new(http.clone(), config.sentiment_url.clone());
    let model_meta = ModelMetaClient::new(http.clone(), sentiment.base_url(), config.model_meta_ttl);

    let state = Arc::new(api::AppState {
        tmdb: TmdbClient::new(http.clone(), config.tmdb_api_key.clone()),
        youtube: YoutubeClient::new(http, config.youtube_api_key.clone()),
        sentiment,
        model_meta,
        cache: TtlCache::new(config.analysis_ttl),
        config,
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/analyze/:movie_id", get(api::get_analysis))
        .route("/sentiment/test", post(api::test_sentiment))
        .route("/reviews/random", get(api::get_random_reviews))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
