use std::sync::Arc;

use crate::{
    models::{
        error::Error,
        geocode::{GeoStreamQuery, GeocodeQuery, Resolved},
        stream::GeoStreamEvent,
    },
    services::location_resolver::GeocodeError,
    utils::state::AppState,
};
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{stream, StreamExt};
use http::StatusCode;
use serde_json::json;
use tracing::warn;

const MAX_BATCH_LOCATIONS: usize = 100;
const BATCH_CONCURRENCY: usize = 5;

pub async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeQuery>,
) -> impl IntoResponse {
    let Some(location) = params
        .location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
    else {
        return Error::new(StatusCode::BAD_REQUEST, "location parameter is required")
            .into_response();
    };

    match state.geocoder.resolve(&location).await {
        Ok(Some(Resolved { hit, cached })) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "coordinates": hit.coordinates,
                "display_name": hit.display_name,
                "cached": cached,
            })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "Location not found"})),
        )
            .into_response(),
        Err(e) => {
            warn!(%location, error = %e, "Geocoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Resolves a `;`-separated list, at most five lookups in flight, reporting
/// results in input order.
pub async fn geocode_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeoStreamQuery>,
) -> Result<impl IntoResponse, Error> {
    let places: Vec<String> = params
        .locations
        .unwrap_or_default()
        .split(';')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if places.is_empty() {
        return Err(Error::new(
            StatusCode::BAD_REQUEST,
            "locations parameter is required",
        ));
    }
    if places.len() > MAX_BATCH_LOCATIONS {
        return Err(Error::new(
            StatusCode::BAD_REQUEST,
            "too many locations, at most 100 per request",
        ));
    }

    let total = places.len();
    let geocoder = state.geocoder.clone();
    let lookups = stream::iter(places)
        .map(move |place| {
            let geocoder = geocoder.clone();
            async move {
                let outcome = geocoder.resolve(&place).await;
                geo_frame(place, outcome)
            }
        })
        .buffered(BATCH_CONCURRENCY);

    let frames = lookups
        .chain(stream::once(async move { GeoStreamEvent::Complete { total } }))
        .map(|frame| Event::default().json_data(frame));

    Ok(Sse::new(frames))
}

fn geo_frame(location: String, outcome: Result<Option<Resolved>, GeocodeError>) -> GeoStreamEvent {
    match outcome {
        Ok(Some(Resolved { hit, cached })) => GeoStreamEvent::Location {
            location,
            coordinates: hit.coordinates,
            display_name: hit.display_name,
            cached,
        },
        Ok(None) => GeoStreamEvent::LocationError {
            location,
            error: "Location not found".to_string(),
        },
        Err(e) => GeoStreamEvent::LocationError {
            location,
            error: e.to_string(),
        },
    }
}
