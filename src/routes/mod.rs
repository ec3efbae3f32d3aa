use axum::{response::IntoResponse, routing::get, Json, Router};
use http::StatusCode;
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::{error::Error, str::FromStr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Registry};

pub mod geocode;
pub mod news;
pub mod social;

use crate::{
    routes::{geocode::geocode_routes, news::news_routes, social::social_routes},
    services::{
        cache_store::{MemoryNewsStore, NewsStore, PgNewsStore},
        llm::{LanguageModel, OpenAiClient},
        location_resolver::{LocationResolver, Nominatim, Photon},
        social_fetcher::TwitterClient,
    },
    utils::{config::Config, rate_limiter::RateLimiter, state::AppState},
};

pub async fn make_app() -> Result<(Router, Config), Box<dyn Error>> {
    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();

    let level = match log_level.as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let filter = filter::Targets::new()
        .with_target("tower_http::trace::on_response", Level::TRACE)
        .with_target("tower_http::trace::on_request", Level::TRACE)
        .with_target("tower_http::trace::make_span", Level::DEBUG)
        .with_target("axum::rejection", Level::TRACE)
        .with_target(env!("CARGO_PKG_NAME"), level)
        .with_default(Level::INFO);

    let tracing_layer = tracing_subscriber::fmt::layer();

    Registry::default().with(tracing_layer).with(filter).init();

    info!("Initializing application...");
    let config = Config::init();
    info!("Configuration loaded successfully");

    let store: Arc<dyn NewsStore> = match &config.database_url {
        Some(url) => {
            let connect_options = PgConnectOptions::from_str(url)?.statement_cache_capacity(0);
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .acquire_timeout(std::time::Duration::from_secs(10))
                .idle_timeout(Some(std::time::Duration::from_secs(60)))
                .connect_with(connect_options)
                .await?;
            sqlx::migrate!("./migrations").run(&db_pool).await?;
            info!("Database connection pool created and migrated");
            Arc::new(PgNewsStore::new(db_pool))
        }
        None => {
            warn!("DATABASE_URL not set, cached news will not survive a restart");
            Arc::new(MemoryNewsStore::new())
        }
    };

    let http_client = reqwest::Client::new();

    let llm: Option<Arc<dyn LanguageModel>> = match &config.openai_api_key {
        Some(key) => Some(Arc::new(OpenAiClient::new(
            http_client.clone(),
            key,
            &config.openai_base_url,
            &config.openai_model,
        ))),
        None => {
            warn!("OPENAI_API_KEY not set, news discovery is disabled");
            None
        }
    };
    if config.twitter_bearer_token.is_none() {
        warn!("TWITTER_BEARER_TOKEN not set, events will carry no social posts");
    }

    let geocoder = LocationResolver::new(vec![
        Box::new(Nominatim::new(http_client.clone(), &config.nominatim_url)),
        Box::new(Photon::new(http_client.clone(), &config.photon_url)),
    ]);
    let social = TwitterClient::new(http_client, config.twitter_bearer_token.clone());
    info!("External clients initialized successfully");

    let state = Arc::new(AppState {
        llm,
        store,
        geocoder: Arc::new(geocoder),
        social: Arc::new(social),
        rate_limiter: RateLimiter::per_minute(),
    });

    let app = build_router(state);
    info!("Application initialized successfully");

    Ok((app, config))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .merge(news_routes())
        .merge(geocode_routes(state.clone()))
        .merge(social_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"message": "ok"}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geocode::GeoHit;
    use crate::services::llm::{LlmError, ToolCall, ToolRequest};
    use crate::services::location_resolver::{GeocodeError, GeocodeProvider};
    use async_trait::async_trait;
    use axum::body::Body;
    use http::Request;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Knows only Paris and Rome; counts upstream calls.
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GeocodeProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn search(&self, place: &str) -> Result<Option<GeoHit>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let coordinates = match place.to_lowercase().as_str() {
                "paris" => [2.35, 48.85],
                "rome" => [12.5, 41.9],
                _ => return Ok(None),
            };
            Ok(Some(GeoHit {
                coordinates,
                display_name: place.to_string(),
            }))
        }
    }

    /// Model that never normalizes and never proposes events.
    struct SilentLlm;

    #[async_trait]
    impl LanguageModel for SilentLlm {
        async fn complete_json(&self, _: &str, _: &str) -> Result<Value, LlmError> {
            Err(LlmError::Network("offline".into()))
        }

        async fn stream_tool_calls(&self, _: &ToolRequest) -> Result<Vec<ToolCall>, LlmError> {
            Ok(vec![])
        }
    }

    fn test_app(llm: Option<Arc<dyn LanguageModel>>) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(AppState {
            social: Arc::new(TwitterClient::new(reqwest::Client::new(), None)),
            llm,
            store: Arc::new(MemoryNewsStore::new()),
            geocoder: Arc::new(LocationResolver::new(vec![Box::new(CountingProvider {
                calls: calls.clone(),
            })])),
            rate_limiter: RateLimiter::per_minute(),
        });
        (build_router(state), calls)
    }

    fn get_from(uri: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, http::HeaderMap, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn health_check_responds() {
        let (app, _) = test_app(None);
        let (status, _, body) = send(&app, get_from("/", "10.0.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["message"], "ok");
    }

    #[tokio::test]
    async fn geocode_requires_location() {
        let (app, calls) = test_app(None);
        for uri in ["/api/geocode", "/api/geocode?location=", "/api/geocode?location=%20%20"] {
            let (status, _, body) = send(&app, get_from(uri, "10.0.0.2")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                json_body(&body),
                json!({"error": "location parameter is required"})
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn geocode_success_then_cached() {
        let (app, calls) = test_app(None);
        let (status, _, body) = send(&app, get_from("/api/geocode?location=Paris", "10.0.0.3")).await;
        assert_eq!(status, StatusCode::OK);
        let first = json_body(&body);
        assert_eq!(first["success"], true);
        assert_eq!(first["coordinates"], json!([2.35, 48.85]));
        assert_eq!(first["cached"], false);

        let (_, _, body) = send(&app, get_from("/api/geocode?location=%20paris%20", "10.0.0.3")).await;
        let second = json_body(&body);
        assert_eq!(second["cached"], true);
        assert_eq!(second["coordinates"], first["coordinates"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn geocode_unknown_place_is_404() {
        let (app, _) = test_app(None);
        let (status, _, body) = send(&app, get_from("/api/geocode?location=Atlantis", "10.0.0.4")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["success"], false);
    }

    #[tokio::test]
    async fn fifty_first_geocode_is_rate_limited_without_upstream_call() {
        let (app, calls) = test_app(None);
        for _ in 0..50 {
            let (status, _, _) = send(&app, get_from("/api/geocode?location=Paris", "10.0.0.5")).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (status, headers, _) = send(&app, get_from("/api/geocode?location=Rome", "10.0.0.5")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // other clients are unaffected
        let (status, _, _) = send(&app, get_from("/api/geocode?location=Rome", "10.0.0.6")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn geocode_stream_reports_each_location_in_order() {
        let (app, _) = test_app(None);
        let (status, headers, body) = send(
            &app,
            get_from("/api/geocode/stream?locations=Paris;Atlantis;%20Rome", "10.0.0.7"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let frames: Vec<Value> = body
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(json_body)
            .collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["type"], "location");
        assert_eq!(frames[0]["location"], "Paris");
        assert_eq!(frames[1]["type"], "location_error");
        assert_eq!(frames[2]["location"], "Rome");
        assert_eq!(frames[3], json!({"type": "complete", "total": 3}));
    }

    #[tokio::test]
    async fn news_stream_without_key_is_500() {
        let (app, _) = test_app(None);
        let (status, _, body) = send(&app, get_from("/api/news/stream?query=kenya", "10.0.0.8")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(&body)["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn news_stream_frames_start_connected_and_end_complete() {
        let (app, _) = test_app(Some(Arc::new(SilentLlm)));
        let (status, headers, body) = send(&app, get_from("/api/news/stream", "10.0.0.9")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let frames: Vec<Value> = body
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(json_body)
            .collect();
        assert_eq!(frames.first().unwrap()["type"], "connected");
        assert_eq!(frames.last().unwrap(), &json!({"type": "complete", "total": 0}));
        assert!(frames.iter().any(|f| f["type"] == "status"));
        assert_eq!(frames.iter().filter(|f| f["type"] == "complete").count(), 1);
    }

    #[tokio::test]
    async fn social_search_without_token_is_500() {
        let (app, _) = test_app(None);
        let (status, _, body) = send(&app, get_from("/api/social/search?query=flood", "10.0.0.10")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(&body)["error"]
            .as_str()
            .unwrap()
            .contains("TWITTER_BEARER_TOKEN"));
    }
}
