use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{GeocodeCandidate, Geocoder, ReverseCandidate};

/// OpenStreetMap Nominatim search and reverse endpoints.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    http: Client,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying user agent.
    pub fn new(base_url: String, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client for Nominatim")?;

        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http })
    }

    async fn get_body(&self, endpoint: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{endpoint}", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Nominatim ({endpoint})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read Nominatim {endpoint} response body"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "Nominatim {} request failed with status {}: {}",
                endpoint,
                status,
                truncate_body(&body),
            ));
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct NmAddress {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NmPlace {
    place_id: Option<u64>,
    name: Option<String>,
    display_name: String,
    lat: String,
    lon: String,
    address: Option<NmAddress>,
}

#[derive(Debug, Deserialize)]
struct NmReverse {
    name: Option<String>,
    display_name: Option<String>,
    address: Option<NmAddress>,
}

fn parse_search(body: &str) -> Result<Vec<GeocodeCandidate>> {
    let places: Vec<NmPlace> =
        serde_json::from_str(body).context("Failed to parse Nominatim search JSON")?;

    Ok(places
        .into_iter()
        .filter_map(|place| {
            let lat = place.lat.trim().parse::<f64>().ok()?;
            let lng = place.lon.trim().parse::<f64>().ok()?;
            Some(GeocodeCandidate {
                place_id: place.place_id.map(|id| id.to_string()),
                name: place.name,
                display_name: place.display_name,
                country: place.address.and_then(|a| a.country),
                lat,
                lng,
            })
        })
        .collect())
}

fn parse_reverse(body: &str) -> Result<Option<ReverseCandidate>> {
    let parsed: NmReverse =
        serde_json::from_str(body).context("Failed to parse Nominatim reverse JSON")?;

    // Points without an address come back as `{"error": "Unable to geocode"}`.
    Ok(parsed.display_name.map(|display_name| ReverseCandidate {
        name: parsed.name,
        display_name,
        country: parsed.address.and_then(|a| a.country),
    }))
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodeCandidate>> {
        let body = self
            .get_body(
                "search",
                &[
                    ("format", "json".to_string()),
                    ("q", query.to_string()),
                    ("limit", limit.to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;

        parse_search(&body)
    }

    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<ReverseCandidate>> {
        let body = self
            .get_body(
                "reverse",
                &[
                    ("format", "json".to_string()),
                    ("lat", lat.to_string()),
                    ("lon", lng.to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;

        parse_reverse(&body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
