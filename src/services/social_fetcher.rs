use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::news::SocialPost;
use crate::models::social::{RateLimitInfo, SearchResponse};

const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const SEARCH_FILTERS: &str = "-is:retweet -is:reply lang:en has:links";
const MAX_POSTS: usize = 10;
const MIN_TEXT_LEN: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("Social bearer token is not configured")]
    MissingToken,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Social search rate limited")]
    RateLimited { reset: Option<i64> },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SocialError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SocialError::Parse(err.to_string())
        } else {
            SocialError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<SocialPost>,
    pub rate_limit: RateLimitInfo,
}

#[async_trait]
pub trait PostSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<SearchPage, SocialError>;
}

/// Supplies corroborating posts for an event. Never fails; no evidence is an
/// empty list.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn fetch(&self, keywords: &str, headline_hint: &str) -> Vec<SocialPost>;
}

pub struct TwitterClient {
    http: reqwest::Client,
    token: Option<String>,
    search_url: String,
}

impl TwitterClient {
    pub fn new(http: reqwest::Client, token: Option<String>) -> Self {
        Self {
            http,
            token,
            search_url: SEARCH_URL.to_string(),
        }
    }
}

#[async_trait]
impl PostSearch for TwitterClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<SearchPage, SocialError> {
        let token = self.token.as_deref().ok_or(SocialError::MissingToken)?;
        let full_query = format!("({}) {}", query, SEARCH_FILTERS);
        // the API only accepts 10..=100
        let max_results = max_results.clamp(10, 100).to_string();

        let response = self
            .http
            .get(&self.search_url)
            .bearer_auth(token)
            .query(&[
                ("query", full_query.as_str()),
                ("max_results", max_results.as_str()),
                ("tweet.fields", "created_at,public_metrics,author_id"),
                ("expansions", "author_id"),
                ("user.fields", "username,name,profile_image_url"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let rate_limit = RateLimitInfo {
            remaining: header_num(&response, "x-rate-limit-remaining"),
            reset: header_num(&response, "x-rate-limit-reset"),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SocialError::RateLimited {
                reset: rate_limit.reset,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SocialError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(SearchPage {
            posts: posts_from_response(body),
            rate_limit,
        })
    }
}

fn header_num<T: std::str::FromStr>(response: &reqwest::Response, name: &str) -> Option<T> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub fn posts_from_response(body: SearchResponse) -> Vec<SocialPost> {
    let users: HashMap<_, _> = body
        .includes
        .users
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    body.data
        .into_iter()
        .map(|tweet| {
            let user = tweet.author_id.as_ref().and_then(|id| users.get(id));
            let author = user.map(|u| u.username.clone()).unwrap_or_default();
            let url = if author.is_empty() {
                format!("https://x.com/i/web/status/{}", tweet.id)
            } else {
                format!("https://x.com/{}/status/{}", author, tweet.id)
            };
            let metrics = tweet.public_metrics.unwrap_or_default();
            SocialPost {
                url,
                name: user.map(|u| u.name.clone()).unwrap_or_default(),
                profile_pic: user
                    .and_then(|u| u.profile_image_url.clone())
                    .unwrap_or_default(),
                author,
                text: tweet.text,
                timestamp: tweet.created_at.unwrap_or_default(),
                likes: metrics.like_count,
                replies: metrics.reply_count,
                reposts: metrics.retweet_count,
                id: tweet.id,
            }
        })
        .collect()
}

/// Query variants in the order they are tried: raw keywords, headline plus
/// keywords, first three keywords.
pub fn query_variants(keywords: &str, headline_hint: &str) -> Vec<String> {
    let keywords = keywords.trim();
    let headline = headline_hint.trim();
    let candidates = [
        keywords.to_string(),
        format!("{} {}", headline, keywords).trim().to_string(),
        keywords
            .split_whitespace()
            .take(3)
            .collect::<Vec<_>>()
            .join(" "),
    ];

    let mut variants: Vec<String> = Vec::new();
    for candidate in candidates {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

fn is_usable(post: &SocialPost) -> bool {
    post.text.trim().chars().count() > MIN_TEXT_LEN
}

pub struct SocialEvidenceFetcher {
    search: Arc<dyn PostSearch>,
}

impl SocialEvidenceFetcher {
    pub fn new(search: Arc<dyn PostSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl EvidenceSource for SocialEvidenceFetcher {
    async fn fetch(&self, keywords: &str, headline_hint: &str) -> Vec<SocialPost> {
        for variant in query_variants(keywords, headline_hint) {
            match self.search.search(&variant, MAX_POSTS as u32).await {
                Ok(page) => {
                    let posts: Vec<SocialPost> = page
                        .posts
                        .into_iter()
                        .filter(is_usable)
                        .take(MAX_POSTS)
                        .collect();
                    if !posts.is_empty() {
                        info!(query = %variant, count = posts.len(), "Found social evidence");
                        return posts;
                    }
                    debug!(query = %variant, "No usable posts for variant");
                }
                Err(SocialError::RateLimited { reset }) => {
                    warn!(query = %variant, ?reset, "Social search rate limited, skipping evidence");
                    return Vec::new();
                }
                Err(SocialError::MissingToken) => return Vec::new(),
                Err(e) => {
                    warn!(query = %variant, error = %e, "Social search failed, trying next variant");
                }
            }
        }
        Vec::new()
    }
}
