use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid latitude range in degrees.
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range in degrees.
pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;

/// Country used when a geocoder response carries none.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&lat) && (MIN_LNG..=MAX_LNG).contains(&lng)
}

/// Identity of a selectable location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LocationId {
    /// Member of the curated catalog.
    Catalog(u32),
    /// Place returned by the geocoder (provider place id).
    Place(String),
    /// Point picked on the map background; never part of the catalog.
    AdHoc,
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationId::Catalog(id) => write!(f, "{id}"),
            LocationId::Place(id) => f.write_str(id),
            LocationId::AdHoc => f.write_str("ad-hoc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// Builds an ad-hoc location from a `"Name, Country"` label.
    ///
    /// The label is split on its first comma; a label without one keeps the
    /// whole text as the name and an unknown country.
    pub fn ad_hoc(label: &str, lat: f64, lng: f64) -> Self {
        let mut parts = label.splitn(2, ',');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let country = parts
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_COUNTRY)
            .to_string();

        Self { id: LocationId::AdHoc, name, country, lat, lng }
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.id == LocationId::AdHoc
    }

    pub fn label(&self) -> String {
        format!("{}, {}", self.name, self.country)
    }
}

/// A geocoder match: a location plus its full human-readable address.
///
/// Only the geocode client builds these (see `GeocodeClient::search`); the
/// fields are read-only outside the crate. Deserialization exists so that
/// persisted history can be read back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    id: String,
    name: String,
    country: String,
    lat: f64,
    lng: f64,
    display_name: String,
}

impl SearchResult {
    pub(crate) fn new(
        id: String,
        name: String,
        country: String,
        lat: f64,
        lng: f64,
        display_name: String,
    ) -> Self {
        Self { id, name, country, lat, lng, display_name }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn to_location(&self) -> Location {
        Location {
            id: LocationId::Place(self.id.clone()),
            name: self.name.clone(),
            country: self.country.clone(),
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// History keeps search results exactly as they were selected.
pub type HistoryEntry = SearchResult;

/// Which user interaction produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionSource {
    Catalog,
    Search,
    History,
    MapMarker,
    MapClick,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionSource::Catalog => "catalog",
            SelectionSource::Search => "search",
            SelectionSource::History => "history",
            SelectionSource::MapMarker => "map-marker",
            SelectionSource::MapClick => "map-click",
        })
    }
}

/// Longitude/latitude pair, in the order map libraries expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

/// Tolerance used when comparing a camera against the home view.
pub const HOME_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewState {
    pub center: LngLat,
    pub zoom: f64,
}

impl MapViewState {
    /// The one and only home view.
    pub const HOME: MapViewState = MapViewState { center: LngLat { lng: 0.0, lat: 20.0 }, zoom: 2.0 };

    pub fn new(lng: f64, lat: f64, zoom: f64) -> Self {
        Self { center: LngLat { lng, lat }, zoom }
    }

    /// True when any axis differs from home by more than [`HOME_TOLERANCE`].
    pub fn has_moved_from_home(&self) -> bool {
        let home = Self::HOME;
        (self.center.lng - home.center.lng).abs() > HOME_TOLERANCE
            || (self.center.lat - home.center.lat).abs() > HOME_TOLERANCE
            || (self.zoom - home.zoom).abs() > HOME_TOLERANCE
    }
}

impl Default for MapViewState {
    fn default() -> Self {
        Self::HOME
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

impl Condition {
    pub fn icon_kind(&self) -> WeatherIcon {
        WeatherIcon::from_code(&self.icon)
    }
}

/// Icon families used when presenting a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherIcon {
    Sun,
    Cloud,
    CloudRain,
}

impl WeatherIcon {
    /// Maps OpenWeather-style icon codes (`01d`, `10n`, ...); unknown codes are cloudy.
    pub fn from_code(code: &str) -> Self {
        match code {
            "01d" | "01n" => WeatherIcon::Sun,
            "09d" | "09n" | "10d" | "10n" | "11d" | "11n" => WeatherIcon::CloudRain,
            _ => WeatherIcon::Cloud,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub visibility_km: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    /// Probability of precipitation, 0..=100.
    pub precipitation_pct: u8,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: DateTime<Utc>,
    pub day_c: f64,
    pub night_c: f64,
    pub min_c: f64,
    pub max_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub precipitation_pct: u8,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub provider: String,
    pub location_name: String,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<DailyForecast>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_hoc_location_splits_label_on_first_comma() {
        let loc = Location::ad_hoc("Westminster, United Kingdom", 51.5, -0.12);
        assert_eq!(loc.id, LocationId::AdHoc);
        assert_eq!(loc.name, "Westminster");
        assert_eq!(loc.country, "United Kingdom");
    }

    #[test]
    fn ad_hoc_location_without_country_is_unknown() {
        let loc = Location::ad_hoc("Location (51.50 -0.12)", 51.5, -0.12);
        assert_eq!(loc.name, "Location (51.50 -0.12)");
        assert_eq!(loc.country, UNKNOWN_COUNTRY);
    }

    #[test]
    fn home_view_has_not_moved() {
        assert!(!MapViewState::HOME.has_moved_from_home());
        assert!(!MapViewState::new(0.05, 20.05, 2.05).has_moved_from_home());
    }

    #[test]
    fn moved_when_any_axis_exceeds_tolerance() {
        assert!(MapViewState::new(0.2, 20.0, 2.0).has_moved_from_home());
        assert!(MapViewState::new(0.0, 19.8, 2.0).has_moved_from_home());
        assert!(MapViewState::new(0.0, 20.0, 10.0).has_moved_from_home());
    }

    #[test]
    fn icon_codes_map_to_families() {
        assert_eq!(WeatherIcon::from_code("01n"), WeatherIcon::Sun);
        assert_eq!(WeatherIcon::from_code("10d"), WeatherIcon::CloudRain);
        assert_eq!(WeatherIcon::from_code("13d"), WeatherIcon::Cloud);
        assert_eq!(WeatherIcon::from_code("zz"), WeatherIcon::Cloud);
    }

    #[test]
    fn coordinate_bounds_are_inclusive() {
        assert!(is_valid_coordinate(90.0, -180.0));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, 180.5));
    }
}
