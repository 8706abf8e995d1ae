//! TMDB catalog client: paginated review fetching, movie metadata, and the
//! random-review sampler behind `/reviews/random`.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::text::is_likely_english;

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Reviews shorter than this are too thin to score meaningfully.
pub const MIN_REVIEW_CHARS: usize = 60;

const POPULAR_PAGE_RANGE: std::ops::RangeInclusive<u32> = 1..=50;

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReview {
    pub author: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ReviewPage {
    results: Vec<TmdbReview>,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct MovieDetail {
    title: Option<String>,
    original_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PopularPage {
    results: Vec<PopularMovie>,
}

#[derive(Debug, Deserialize)]
struct PopularMovie {
    id: Option<u64>,
    title: Option<String>,
    original_title: Option<String>,
}

/// One representative review of a popular movie, served raw so the UI can
/// feed it back through the sentiment tester.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RandomReview {
    pub movie_id: u64,
    pub movie_title: String,
    pub author: String,
    pub content: String,
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl TmdbClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self::with_base_url(http, api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Client pointed at an alternate API root, so tests can stand in a
    /// local server.
    pub fn with_base_url(http: reqwest::Client, api_key: Option<String>, base_url: String) -> Self {
        TmdbClient {
            http,
            api_key,
            base_url,
        }
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("TMDB_API_KEY not configured"))
    }

    /// Fetch every review page for a movie, sequentially: page N+1 is only
    /// requested once page N reported the total page count. Any page failure
    /// aborts the whole fetch. The result is filtered to reviews of at least
    /// [`MIN_REVIEW_CHARS`] characters; an empty list is a valid outcome.
    pub async fn fetch_reviews(&self, movie_id: &str) -> Result<Vec<TmdbReview>> {
        let key = self.key()?;
        let url = format!("{}/movie/{}/reviews", self.base_url, movie_id);

        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let page_param = page.to_string();
            let body: ReviewPage = self
                .http
                .get(&url)
                .query(&[
                    ("api_key", key),
                    ("language", "en-US"),
                    ("page", page_param.as_str()),
                ])
                .send()
                .await
                .context("tmdb reviews request failed")?
                .error_for_status()
                .context("tmdb reviews request rejected")?
                .json()
                .await
                .context("tmdb reviews response malformed")?;

            let total_pages = body.total_pages;
            all.extend(body.results);

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        all.retain(|r| r.content.chars().count() >= MIN_REVIEW_CHARS);
        Ok(all)
    }

    /// Display title for a movie, used to build the comment-provider search
    /// query. Falls back to the original title, then to an empty string.
    pub async fn fetch_title(&self, movie_id: &str) -> Result<String> {
        let key = self.key()?;
        let url = format!("{}/movie/{}", self.base_url, movie_id);

        let detail: MovieDetail = self
            .http
            .get(&url)
            .query(&[("api_key", key), ("language", "en-US")])
            .send()
            .await
            .context("tmdb movie request failed")?
            .error_for_status()
            .context("tmdb movie request rejected")?
            .json()
            .await
            .context("tmdb movie response malformed")?;

        Ok(detail
            .title
            .or(detail.original_title)
            .unwrap_or_default())
    }

    async fn popular_page(&self, page: u32) -> Result<Vec<PopularMovie>> {
        let key = self.key()?;
        let url = format!("{}/movie/popular", self.base_url);

        let page_param = page.to_string();
        let body: PopularPage = self
            .http
            .get(&url)
            .query(&[
                ("api_key", key),
                ("language", "en-US"),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .context("tmdb popular request failed")?
            .error_for_status()
            .context("tmdb popular request rejected")?
            .json()
            .await
            .context("tmdb popular response malformed")?;

        Ok(body.results)
    }

    /// Draw random pages of popular movies and keep the first qualifying
    /// English review per movie, until `target` representatives are found or
    /// the attempt budget runs out. Partial results are not an error.
    pub async fn sample_random_reviews(
        &self,
        target: usize,
        max_attempts: u32,
    ) -> Result<Vec<RandomReview>> {
        let mut picked: Vec<RandomReview> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut attempts = 0u32;

        while picked.len() < target && attempts < max_attempts {
            attempts += 1;
            // thread_rng is not Send; draw the page number before any await.
            let page = {
                use rand::Rng;
                rand::thread_rng().gen_range(POPULAR_PAGE_RANGE)
            };

            let movies = self.popular_page(page).await?;
            for movie in movies {
                if picked.len() >= target {
                    break;
                }
                let Some(id) = movie.id else { continue };
                if !seen.insert(id) {
                    continue;
                }

                let reviews = self.fetch_reviews(&id.to_string()).await?;
                let Some(review) = reviews.iter().find(|r| is_likely_english(&r.content)) else {
                    continue;
                };

                picked.push(RandomReview {
                    movie_id: id,
                    movie_title: movie
                        .title
                        .or(movie.original_title)
                        .unwrap_or_default(),
                    author: review.author.clone(),
                    content: review.content.clone(),
                });
            }
        }

        picked.truncate(target);
        Ok(picked)
    }
}
