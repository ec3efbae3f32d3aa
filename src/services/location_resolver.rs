use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as TtlDuration;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::cache::BoundedCache;
use crate::models::geocode::{GeoHit, NominatimPlace, PhotonResponse, Resolved};

const CACHE_CAPACITY: usize = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "newsmap/1.0";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Geocoder returned status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Geocoder rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl GeocodeError {
    fn is_retryable(&self) -> bool {
        match self {
            GeocodeError::Network(_) | GeocodeError::RateLimited { .. } => true,
            GeocodeError::Http { status, .. } => *status >= 500,
            GeocodeError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GeocodeError::Parse(err.to_string())
        } else {
            GeocodeError::Network(err.to_string())
        }
    }
}

/// One geocoding backend. `Ok(None)` means the place is unknown to it.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, place: &str) -> Result<Option<GeoHit>, GeocodeError>;
}

#[async_trait]
pub trait Geocode: Send + Sync {
    async fn resolve(&self, place: &str) -> Result<Option<Resolved>, GeocodeError>;
}

pub struct Nominatim {
    http: reqwest::Client,
    base_url: String,
}

impl Nominatim {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GeocodeProvider for Nominatim {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn search(&self, place: &str) -> Result<Option<GeoHit>, GeocodeError> {
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .header("User-Agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let places: Vec<NominatimPlace> = check_status(response).await?.json().await?;
        parse_nominatim(places)
    }
}

pub struct Photon {
    http: reqwest::Client,
    base_url: String,
}

impl Photon {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GeocodeProvider for Photon {
    fn name(&self) -> &'static str {
        "photon"
    }

    async fn search(&self, place: &str) -> Result<Option<GeoHit>, GeocodeError> {
        let response = self
            .http
            .get(format!("{}/api/", self.base_url))
            .query(&[("q", place), ("limit", "1")])
            .header("User-Agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let body: PhotonResponse = check_status(response).await?.json().await?;
        Ok(parse_photon(body))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GeocodeError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(GeocodeError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GeocodeError::Http {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

pub fn parse_nominatim(places: Vec<NominatimPlace>) -> Result<Option<GeoHit>, GeocodeError> {
    let Some(first) = places.into_iter().next() else {
        return Ok(None);
    };
    let lat: f64 = first
        .lat
        .parse()
        .map_err(|_| GeocodeError::Parse(format!("bad latitude '{}'", first.lat)))?;
    let lon: f64 = first
        .lon
        .parse()
        .map_err(|_| GeocodeError::Parse(format!("bad longitude '{}'", first.lon)))?;
    Ok(Some(GeoHit {
        coordinates: [lon, lat],
        display_name: first.display_name,
    }))
}

pub fn parse_photon(body: PhotonResponse) -> Option<GeoHit> {
    let feature = body.features.into_iter().next()?;
    let [lon, lat] = feature.geometry.coordinates.get(..2)? else {
        return None;
    };
    let props = feature.properties;
    let display_name = [props.name, props.city, props.state, props.country]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    Some(GeoHit {
        coordinates: [*lon, *lat],
        display_name,
    })
}

/// Cache identity for a free-text place name.
pub fn cache_key(place: &str) -> String {
    place.trim().to_lowercase()
}

/// Resolves place names through an ordered provider chain. A provider's
/// network failure moves on to the next provider; any other outcome is final
/// for that attempt. Whole attempts are retried on transient failures.
pub struct LocationResolver {
    providers: Vec<Box<dyn GeocodeProvider>>,
    cache: Mutex<BoundedCache<GeoHit>>,
    max_retries: u32,
    backoff: Duration,
}

impl LocationResolver {
    pub fn new(providers: Vec<Box<dyn GeocodeProvider>>) -> Self {
        Self {
            providers,
            cache: Mutex::new(BoundedCache::new(CACHE_CAPACITY, TtlDuration::hours(24))),
            max_retries: 2,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn query_chain(&self, place: &str) -> Result<Option<GeoHit>, GeocodeError> {
        let mut last_err = GeocodeError::Network("no geocoding providers configured".to_string());
        for provider in &self.providers {
            match provider.search(place).await {
                Err(GeocodeError::Network(e)) => {
                    warn!(provider = provider.name(), place, error = %e, "Geocoder unreachable, trying next");
                    last_err = GeocodeError::Network(e);
                }
                outcome => return outcome,
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl Geocode for LocationResolver {
    async fn resolve(&self, place: &str) -> Result<Option<Resolved>, GeocodeError> {
        let key = cache_key(place);
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(place, "Geocode cache hit");
            return Ok(Some(Resolved { hit, cached: true }));
        }

        let mut attempt = 0;
        loop {
            match self.query_chain(place.trim()).await {
                Ok(Some(hit)) => {
                    self.cache.lock().await.insert(key, hit.clone());
                    return Ok(Some(Resolved { hit, cached: false }));
                }
                Ok(None) => return Ok(None),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        GeocodeError::RateLimited {
                            retry_after: Some(after),
                        } => *after,
                        _ => self.backoff * attempt,
                    };
                    warn!(place, attempt, error = %e, ?delay, "Geocode failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
