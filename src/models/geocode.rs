use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct GeocodeQuery {
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct GeoStreamQuery {
    pub locations: Option<String>,
}

/// A resolved place: `[longitude, latitude]` plus the provider's label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoHit {
    pub coordinates: [f64; 2],
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub hit: GeoHit,
    pub cached: bool,
}

#[derive(Deserialize)]
pub struct NominatimPlace {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct PhotonResponse {
    #[serde(default)]
    pub features: Vec<PhotonFeature>,
}

#[derive(Deserialize)]
pub struct PhotonFeature {
    pub geometry: PhotonGeometry,
    #[serde(default)]
    pub properties: PhotonProperties,
}

#[derive(Deserialize)]
pub struct PhotonGeometry {
    pub coordinates: Vec<f64>,
}

#[derive(Deserialize, Default)]
pub struct PhotonProperties {
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}
