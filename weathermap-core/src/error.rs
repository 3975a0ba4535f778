//! Error taxonomy.
//!
//! Only [`MapError`] is ever surfaced to the user. The others are logged and
//! degraded at the component boundary that produces them.

use std::time::Duration;
use thiserror::Error;

/// Failures of the interactive map. `LibraryLoad` and `Runtime` are fatal
/// for the session and leave the engine in its terminal failed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("failed to load map library: {0}")]
    LibraryLoad(String),

    #[error("map error: {0}")]
    Runtime(String),

    #[error("map is not ready")]
    NotReady,
}

impl MapError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MapError::NotReady)
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder did not answer within {0:?}")]
    Timeout(Duration),

    #[error("geocoder request failed: {0:#}")]
    Provider(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("weather fetch failed: {0}")]
pub struct WeatherFetchError(pub String);
