use std::sync::Arc;

use crate::{
    models::error::Error,
    services::stream_relay::StreamRelay,
    utils::state::AppState,
};
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::StreamExt;
use http::StatusCode;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

#[derive(Deserialize)]
pub struct NewsQuery {
    pub query: Option<String>,
}

pub async fn stream_news(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NewsQuery>,
) -> Result<impl IntoResponse, Error> {
    let engine = state.discovery_engine().ok_or_else(|| {
        Error::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_API_KEY is not configured",
        )
    })?;

    let query = params.query.unwrap_or_default();
    info!(query = %query, "Starting news discovery stream");

    let (relay, rx) = StreamRelay::open();
    tokio::spawn(async move {
        engine.stream(&query, relay).await;
    });

    let frames = ReceiverStream::new(rx).map(|frame| Event::default().json_data(frame));
    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}
