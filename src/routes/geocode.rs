use crate::{
    handlers::{
        geocode::{geocode, geocode_stream},
        middleware::rate_limit_middleware,
    },
    utils::state::AppState,
};
use axum::{extract::State, middleware::from_fn, routing::get, Router};
use std::sync::Arc;

pub fn geocode_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let geocode_router = Router::new()
        .route("/api/geocode", get(geocode))
        .route("/api/geocode/stream", get(geocode_stream));

    geocode_router.route_layer(from_fn(move |req, next| {
        rate_limit_middleware(State(state.clone()), req, next)
    }))
}
