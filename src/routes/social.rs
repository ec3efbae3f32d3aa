use std::sync::Arc;

use axum::{routing::get, Router};

use crate::{handlers::social::search_posts, utils::state::AppState};

pub fn social_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/social/search", get(search_posts))
}
