use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse granularity of a query; decides how many events a run aims for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Region,
    Local,
}

impl Scope {
    pub fn target_count(self) -> usize {
        match self {
            Scope::Global => 40,
            Scope::Region => 20,
            Scope::Local => 5,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "global" => Some(Scope::Global),
            "region" | "regional" => Some(Scope::Region),
            "local" => Some(Scope::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialPost {
    pub id: String,
    pub author: String,
    pub name: String,
    pub text: String,
    pub url: String,
    pub timestamp: String,
    pub likes: i64,
    pub replies: i64,
    pub reposts: i64,
    pub profile_pic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsEvent {
    pub id: Uuid,
    pub headline: String,
    pub location: String,
    pub summary: String,
    pub category: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
    pub timestamp: DateTime<Utc>,
    pub top_tweets: Vec<SocialPost>,
}

/// A fresh cache record for a normalized key, with its still-recent events.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub id: Uuid,
    pub normalized_key: String,
    pub original_query: String,
    pub last_refresh: DateTime<Utc>,
    pub events: Vec<NewsEvent>,
}

/// Outcome of persisting an event. `Existing` means the headline+location pair
/// was already stored and the stored row is returned instead.
#[derive(Debug, Clone)]
pub enum Persisted {
    Created(NewsEvent),
    Existing(NewsEvent),
}

impl Persisted {
    pub fn into_event(self) -> NewsEvent {
        match self {
            Persisted::Created(event) | Persisted::Existing(event) => event,
        }
    }
}

/// One proposed event from a single `report_news_event` tool invocation.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Candidate {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub search_query: Option<String>,
}

/// Display bucket for a free-text category.
pub fn category_group(category: &str) -> &'static str {
    let c = category.trim().to_lowercase();
    const GROUPS: &[(&str, &[&str])] = &[
        ("conflict", &["conflict", "war", "military", "attack", "terror", "protest", "unrest"]),
        ("politics", &["politic", "election", "government", "diplomac", "policy"]),
        ("disaster", &["disaster", "earthquake", "flood", "storm", "hurricane", "wildfire", "fire", "accident"]),
        ("economy", &["econom", "business", "financ", "market", "trade"]),
        ("health", &["health", "medic", "disease", "pandemic", "outbreak"]),
        ("technology", &["tech", "cyber", "ai ", "artificial"]),
        ("science", &["scien", "space", "research"]),
        ("sports", &["sport", "football", "soccer", "olymp"]),
        ("crime", &["crime", "police", "court", "legal", "justice"]),
        ("environment", &["environment", "climate", "weather", "energy"]),
    ];

    // prefix matches win over substring matches
    for (group, needles) in GROUPS {
        if needles.iter().any(|n| c.starts_with(*n)) {
            return *group;
        }
    }
    for (group, needles) in GROUPS {
        if needles.iter().any(|n| n.len() > 3 && c.contains(*n)) {
            return *group;
        }
    }
    "other"
}
