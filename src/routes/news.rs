use std::sync::Arc;

use axum::{routing::get, Router};

use crate::{handlers::news::stream_news, utils::state::AppState};

pub fn news_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/news/stream", get(stream_news))
}
