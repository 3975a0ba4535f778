//! Core library for the `weathermap` tool.
//!
//! This crate defines:
//! - The location model and the curated city catalog
//! - Geocoding (text search and reverse lookup) with graceful degradation
//! - Persisted, bounded search history
//! - The debounced search controller
//! - The map engine: library lifecycle, markers, camera commands
//! - The resolver that reconciles every kind of pick into one selection
//!
//! It is used by `weathermap-cli`, but any front end that can drive a map
//! library through [`map::MapLibrary`] can reuse it.

pub mod catalog;
pub mod config;
pub mod error;
pub mod geocode;
pub mod history;
pub mod map;
pub mod model;
pub mod resolver;
pub mod search;
pub mod session;
pub mod weather;

pub use config::Config;
pub use error::{GeocodeError, MapError, PersistenceError, WeatherFetchError};
pub use geocode::{GeocodeClient, Geocoder};
pub use history::{FileStore, KeyValueStore, MemoryStore, SearchHistoryStore};
pub use map::{LifecycleState, MapEngine, MapEvent, MapLibrary};
pub use model::{HistoryEntry, Location, LocationId, MapViewState, SearchResult, SelectionSource, WeatherReport};
pub use resolver::{DetailStatus, DetailView, LocationResolver};
pub use search::{DisplayItem, Panel, SearchController};
pub use session::Session;
pub use weather::{SyntheticWeather, WeatherProvider};
