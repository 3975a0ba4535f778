use crate::{
    Config,
    error::GeocodeError,
    geocode::nominatim::NominatimGeocoder,
    model::{Location, LocationId, SearchResult, UNKNOWN_COUNTRY, is_valid_coordinate},
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tracing::{debug, warn};

pub mod nominatim;

/// One raw candidate from a text search, before normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeocodeCandidate {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub display_name: String,
    pub country: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

/// One raw address from a reverse lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReverseCandidate {
    pub name: Option<String>,
    pub display_name: String,
    pub country: Option<String>,
}

/// A text-search and reverse-geocoding service.
#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<GeocodeCandidate>>;

    /// `Ok(None)` when the service has no address for the point.
    async fn reverse(&self, lat: f64, lng: f64) -> anyhow::Result<Option<ReverseCandidate>>;
}

/// Label used when a point cannot be reverse geocoded.
pub fn fallback_label(lat: f64, lng: f64) -> String {
    format!("Location ({lat:.2}, {lng:.2})")
}

/// Failure-free front of a [`Geocoder`].
///
/// Searches degrade to an empty list and reverse lookups to
/// [`fallback_label`]; every call is bounded by a timeout.
#[derive(Debug, Clone)]
pub struct GeocodeClient {
    provider: Arc<dyn Geocoder>,
    timeout: Duration,
    limit: usize,
}

impl GeocodeClient {
    pub fn new(provider: Arc<dyn Geocoder>) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            limit: crate::config::DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        match self.try_search(query).await {
            Ok(results) => {
                debug!(query, count = results.len(), "geocode search finished");
                results
            }
            Err(err) => {
                warn!(query, error = %err, "geocode search failed, showing no results");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>, GeocodeError> {
        let candidates = tokio::time::timeout(self.timeout, self.provider.search(query, self.limit))
            .await
            .map_err(|_| GeocodeError::Timeout(self.timeout))??;

        Ok(candidates
            .into_iter()
            .enumerate()
            .filter_map(|(index, candidate)| normalize_candidate(index, candidate))
            .collect())
    }

    /// Resolves a point to `"Name, Country"`, never failing.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> String {
        match self.try_reverse(lat, lng).await {
            Ok(Some(label)) => label,
            Ok(None) => {
                debug!(lat, lng, "no address for point, using fallback label");
                fallback_label(lat, lng)
            }
            Err(err) => {
                warn!(lat, lng, error = %err, "reverse geocode failed, using fallback label");
                fallback_label(lat, lng)
            }
        }
    }

    /// Turns a clicked point into an ad-hoc location.
    ///
    /// When no address can be found the location is named after
    /// [`fallback_label`] as a whole.
    pub async fn locate_point(&self, lat: f64, lng: f64) -> Location {
        match self.try_reverse(lat, lng).await {
            Ok(Some(label)) => Location::ad_hoc(&label, lat, lng),
            Ok(None) => unresolved_point(lat, lng),
            Err(err) => {
                warn!(lat, lng, error = %err, "reverse geocode failed, using fallback label");
                unresolved_point(lat, lng)
            }
        }
    }

    async fn try_reverse(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError> {
        let candidate = tokio::time::timeout(self.timeout, self.provider.reverse(lat, lng))
            .await
            .map_err(|_| GeocodeError::Timeout(self.timeout))??;

        Ok(candidate.and_then(reverse_label))
    }
}

fn unresolved_point(lat: f64, lng: f64) -> Location {
    Location {
        id: LocationId::AdHoc,
        name: fallback_label(lat, lng),
        country: UNKNOWN_COUNTRY.to_string(),
        lat,
        lng,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_candidate(index: usize, candidate: GeocodeCandidate) -> Option<SearchResult> {
    if !is_valid_coordinate(candidate.lat, candidate.lng) {
        debug!(display_name = %candidate.display_name, "dropping candidate with invalid coordinates");
        return None;
    }

    let id = non_empty(candidate.place_id).unwrap_or_else(|| index.to_string());
    let name = non_empty(candidate.name).unwrap_or_else(|| {
        candidate.display_name.split(',').next().unwrap_or_default().trim().to_string()
    });
    let country = non_empty(candidate.country).unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

    Some(SearchResult::new(id, name, country, candidate.lat, candidate.lng, candidate.display_name))
}

fn reverse_label(candidate: ReverseCandidate) -> Option<String> {
    if candidate.display_name.trim().is_empty() {
        return None;
    }

    let parts: Vec<&str> = candidate.display_name.split(',').collect();
    let name = non_empty(candidate.name)
        .unwrap_or_else(|| parts.first().copied().unwrap_or_default().trim().to_string());
    let country = non_empty(candidate.country)
        .unwrap_or_else(|| parts.last().copied().unwrap_or_default().trim().to_string());

    Some(format!("{name}, {country}"))
}

/// Construct a geocode client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<GeocodeClient> {
    let provider = NominatimGeocoder::new(
        config.geocoder.base_url.clone(),
        &config.geocoder.user_agent,
    )?;

    Ok(GeocodeClient::new(Arc::new(provider))
        .with_timeout(config.geocoder.timeout())
        .with_limit(config.geocoder.result_limit))
}
