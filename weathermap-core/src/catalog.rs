//! The curated list of catalog locations shown in the list view and as map markers.

use crate::model::{Location, LocationId};

const CITIES: &[(u32, &str, &str, f64, f64)] = &[
    (1, "New York", "USA", 40.7128, -74.006),
    (2, "London", "UK", 51.5074, -0.1278),
    (3, "Tokyo", "Japan", 35.6762, 139.6503),
    (4, "Paris", "France", 48.8566, 2.3522),
    (5, "Sydney", "Australia", -33.8688, 151.2093),
    (6, "Dubai", "UAE", 25.2048, 55.2708),
    (7, "Singapore", "Singapore", 1.3521, 103.8198),
    (8, "Mumbai", "India", 19.076, 72.8777),
    (9, "São Paulo", "Brazil", -23.5505, -46.6333),
    (10, "Cairo", "Egypt", 30.0444, 31.2357),
    (11, "Moscow", "Russia", 55.7558, 37.6176),
    (12, "Beijing", "China", 39.9042, 116.4074),
    (13, "Lagos", "Nigeria", 6.5244, 3.3792),
    (14, "Mexico City", "Mexico", 19.4326, -99.1332),
    (15, "Istanbul", "Turkey", 41.0082, 28.9784),
    (16, "Bangkok", "Thailand", 13.7563, 100.5018),
    (17, "Buenos Aires", "Argentina", -34.6118, -58.396),
    (18, "Toronto", "Canada", 43.6532, -79.3832),
    (19, "Cape Town", "South Africa", -33.9249, 18.4241),
    (20, "Seoul", "South Korea", 37.5665, 126.978),
];

fn to_location(&(id, name, country, lat, lng): &(u32, &str, &str, f64, f64)) -> Location {
    Location {
        id: LocationId::Catalog(id),
        name: name.to_string(),
        country: country.to_string(),
        lat,
        lng,
    }
}

/// All catalog locations, in catalog order.
pub fn all() -> Vec<Location> {
    CITIES.iter().map(to_location).collect()
}

pub fn get(id: u32) -> Option<Location> {
    CITIES.iter().find(|c| c.0 == id).map(to_location)
}

/// Case-insensitive lookup by exact city name.
pub fn find_by_name(name: &str) -> Option<Location> {
    let needle = name.trim().to_lowercase();
    CITIES.iter().find(|c| c.1.to_lowercase() == needle).map(to_location)
}

/// Catalog entries whose name or country contains `term`, ignoring case.
/// An empty term matches everything.
pub fn filter(term: &str) -> Vec<Location> {
    let needle = term.trim().to_lowercase();
    CITIES
        .iter()
        .filter(|c| c.1.to_lowercase().contains(&needle) || c.2.to_lowercase().contains(&needle))
        .map(to_location)
        .collect()
}
