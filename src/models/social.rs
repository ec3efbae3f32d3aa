use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SocialSearchQuery {
    pub query: Option<String>,
    #[serde(rename = "maxResults")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset: Option<i64>,
}

// Twitter v2 recent-search payload, only the fields we read.

#[derive(Deserialize, Default)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<TweetData>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Deserialize)]
pub struct TweetData {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<String>,
    pub public_metrics: Option<PublicMetrics>,
}

#[derive(Deserialize, Default)]
pub struct PublicMetrics {
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
}

#[derive(Deserialize, Default)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<TweetUser>,
}

#[derive(Deserialize)]
pub struct TweetUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub profile_image_url: Option<String>,
}
