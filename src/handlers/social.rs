use std::sync::Arc;

use crate::{
    models::{error::Error, social::SocialSearchQuery},
    services::social_fetcher::SocialError,
    utils::state::AppState,
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use http::StatusCode;
use serde_json::json;
use tracing::warn;

const DEFAULT_QUERY: &str = "breaking news";

pub async fn search_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SocialSearchQuery>,
) -> Result<impl IntoResponse, Error> {
    let query = params
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());
    let max_results = params.max_results.unwrap_or(10).clamp(10, 100);

    match state.social.search(&query, max_results).await {
        Ok(page) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "query": query,
                "posts": page.posts,
                "rateLimit": page.rate_limit,
            })),
        )),
        Err(SocialError::MissingToken) => Err(Error::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "TWITTER_BEARER_TOKEN is not configured",
        )),
        Err(SocialError::RateLimited { reset }) => Err(Error::with_body(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "error": "Social search rate limited",
                "rateLimit": {"remaining": 0, "reset": reset},
            }),
        )),
        Err(e) => {
            warn!(%query, error = %e, "Social search failed");
            Err(Error::new(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}
