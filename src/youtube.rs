//! YouTube comment source.
//!
//! Comment enrichment is best-effort: the analysis proceeds with TMDB data
//! alone whenever this source degrades. The outcome type makes that decision
//! explicit for the orchestrator instead of hiding it behind a swallowed
//! error.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// How many related videos to try per movie.
const MAX_VIDEOS: usize = 5;
/// Global comment budget across all videos of one analysis.
const GLOBAL_COMMENT_CAP: usize = 400;
/// Per-video ceiling, within whatever remains of the global budget.
const PER_VIDEO_CAP: usize = 200;
/// The API serves at most 100 comment threads per page.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct YoutubeComment {
    pub comment_id: String,
    pub author: String,
    pub text: String,
    pub like_count: i64,
}

/// Result of one comment-gathering pass.
pub enum CommentOutcome {
    /// Comments were gathered (possibly zero, possibly from fewer videos
    /// than requested if individual fetches failed).
    Harvested {
        comments: Vec<YoutubeComment>,
        /// First related video found, surfaced to the UI for embedding.
        video_id: Option<String>,
        query: String,
    },
    /// Nothing gathered; the analysis continues without comment data.
    Degraded { reason: String },
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsResponse {
    #[serde(default)]
    items: Vec<ThreadItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadItem {
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    author_display_name: String,
    text_display: String,
    #[serde(default)]
    like_count: i64,
}

pub struct YoutubeClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self::with_base_url(http, api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Client pointed at an alternate API root, so tests can stand in a
    /// local server.
    pub fn with_base_url(http: reqwest::Client, api_key: Option<String>, base_url: String) -> Self {
        YoutubeClient {
            http,
            api_key,
            base_url,
        }
    }

    /// Gather comments for a movie by its display title. Never returns an
    /// error: any condition that prevents gathering yields `Degraded`.
    pub async fn gather_for_title(&self, title: &str) -> CommentOutcome {
        let Some(key) = self.api_key.as_deref() else {
            return CommentOutcome::Degraded {
                reason: "YOUTUBE_API_KEY not configured".to_string(),
            };
        };
        if title.trim().is_empty() {
            return CommentOutcome::Degraded {
                reason: "no title to search for".to_string(),
            };
        }

        let query = format!("{} movie", title);
        let video_ids = match self.search_videos(key, &query, MAX_VIDEOS).await {
            Ok(ids) => ids,
            Err(err) => {
                return CommentOutcome::Degraded {
                    reason: format!("video search failed: {err:#}"),
                };
            }
        };

        let mut comments: Vec<YoutubeComment> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut first_video: Option<String> = None;

        // Sequential on purpose: the remaining-budget accounting depends on
        // how many comments earlier videos contributed.
        for video_id in video_ids {
            if first_video.is_none() {
                first_video = Some(video_id.clone());
            }
            let remaining = GLOBAL_COMMENT_CAP.saturating_sub(comments.len());
            if remaining == 0 {
                break;
            }

            match self
                .fetch_comments(key, &video_id, remaining.min(PER_VIDEO_CAP))
                .await
            {
                Ok(batch) => absorb(batch, &mut seen, &mut comments),
                Err(err) => {
                    // Comments disabled, quota blips and the like: skip the
                    // video, keep whatever the others yield.
                    tracing::warn!(%video_id, error = %err, "comment fetch failed, skipping video");
                }
            }
        }

        CommentOutcome::Harvested {
            comments,
            video_id: first_video,
            query,
        }
    }

    async fn search_videos(&self, key: &str, query: &str, max: usize) -> Result<Vec<String>> {
        let url = format!("{}/search", self.base_url);
        let max_param = max.to_string();
        let body: SearchResponse = self
            .http
            .get(&url)
            .query(&[
                ("key", key),
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", max_param.as_str()),
            ])
            .send()
            .await
            .context("youtube search request failed")?
            .error_for_status()
            .context("youtube search request rejected")?
            .json()
            .await
            .context("youtube search response malformed")?;

        Ok(body
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect())
    }

    async fn fetch_comments(
        &self,
        key: &str,
        video_id: &str,
        cap: usize,
    ) -> Result<Vec<YoutubeComment>> {
        let url = format!("{}/commentThreads", self.base_url);
        let mut comments: Vec<YoutubeComment> = Vec::new();
        let mut page_token: Option<String> = None;

        while comments.len() < cap {
            let page_size = (cap - comments.len()).min(PAGE_SIZE);
            let page_param = page_size.to_string();
            let mut request = self.http.get(&url).query(&[
                ("key", key),
                ("part", "snippet"),
                ("videoId", video_id),
                ("textFormat", "plainText"),
                ("maxResults", page_param.as_str()),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let body: ThreadsResponse = request
                .send()
                .await
                .context("youtube comments request failed")?
                .error_for_status()
                .context("youtube comments request rejected")?
                .json()
                .await
                .context("youtube comments response malformed")?;

            // Some responses carry a nextPageToken alongside an empty items
            // list; a page that contributes nothing cannot make progress.
            if body.items.is_empty() {
                break;
            }

            for item in body.items {
                let top = item.snippet.top_level_comment;
                comments.push(YoutubeComment {
                    comment_id: top.id,
                    author: top.snippet.author_display_name,
                    text: top.snippet.text_display,
                    like_count: top.snippet.like_count,
                });
            }

            match body.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        comments.truncate(cap);
        Ok(comments)
    }
}

/// Append a batch, dropping comments already seen under another video.
fn absorb(
    batch: Vec<YoutubeComment>,
    seen: &mut HashSet<String>,
    out: &mut Vec<YoutubeComment>,
) {
    for comment in batch {
        if seen.insert(comment.comment_id.clone()) {
            out.push(comment);
        }
    }
}
