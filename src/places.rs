use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::BackendClient;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geo::Coordinate;

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub place_id: String,
    pub name: String,
    pub location: Coordinate,
}

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn find_nearby(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>>;
}

#[derive(Debug, Deserialize)]
pub(crate) struct NearbyPlace {
    place_id: Option<String>,
    name: Option<String>,
    geometry: Option<NearbyGeometry>,
}

#[derive(Debug, Deserialize)]
struct NearbyGeometry {
    location: Option<NearbyLocation>,
}

#[derive(Debug, Deserialize)]
struct NearbyLocation {
    lat: f64,
    lng: f64,
}

impl NearbyPlace {
    fn into_candidate(self) -> Option<PlaceCandidate> {
        let place_id = self.place_id.filter(|id| !id.trim().is_empty())?;
        let location = self.geometry.and_then(|geometry| geometry.location)?;
        let location = Coordinate::checked(location.lat, location.lng).ok()?;
        Some(PlaceCandidate {
            name: self.name.unwrap_or_else(|| place_id.clone()),
            place_id,
            location,
        })
    }
}

pub(crate) fn into_candidates(places: Vec<NearbyPlace>) -> Vec<PlaceCandidate> {
    let total = places.len();
    let candidates: Vec<_> = places
        .into_iter()
        .filter_map(NearbyPlace::into_candidate)
        .collect();
    if candidates.len() < total {
        debug!(
            target: "places",
            dropped = total - candidates.len(),
            "skipped places without id or coordinates"
        );
    }
    candidates
}

pub(crate) fn http_client() -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(AppError::from)
}

#[derive(Clone)]
pub struct PlacesService {
    inner: Arc<dyn PlacesProvider>,
}

impl PlacesService {
    pub fn new(config: &AppConfig, backend: &BackendClient) -> AppResult<Self> {
        if let Some(key) = config.google_places_api_key.clone() {
            let client = GooglePlacesClient::new(config.google_places_endpoint.clone(), key)?;
            Ok(Self::from_provider(Arc::new(client)))
        } else {
            Ok(Self::from_provider(Arc::new(backend.clone())))
        }
    }

    pub fn from_provider(provider: Arc<dyn PlacesProvider>) -> Self {
        Self { inner: provider }
    }
}

#[async_trait]
impl PlacesProvider for PlacesService {
    async fn find_nearby(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>> {
        self.inner
            .find_nearby(location, place_type, radius_meters)
            .await
    }
}

pub struct GooglePlacesClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
}

impl GooglePlacesClient {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> AppResult<Self> {
        Ok(Self {
            http: http_client()?,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesClient {
    async fn find_nearby(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>> {
        #[derive(Deserialize)]
        struct Response {
            status: String,
            #[serde(default)]
            results: Vec<NearbyPlace>,
            error_message: Option<String>,
        }

        let location_param = format!("{},{}", location.latitude, location.longitude);
        let radius_param = radius_meters.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("location", location_param.as_str()),
                ("radius", radius_param.as_str()),
                ("type", place_type),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        match parsed.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            status => {
                let detail = parsed
                    .error_message
                    .map(|message| format!("{status}: {message}"))
                    .unwrap_or_else(|| status.to_string());
                return Err(AppError::Provider(detail));
            }
        }

        let candidates = into_candidates(parsed.results);
        trace!(
            target: "places",
            place_type,
            radius_meters,
            found = candidates.len(),
            "nearby search completed"
        );
        Ok(candidates)
    }
}
