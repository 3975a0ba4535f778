use crate::{
    catalog,
    error::MapError,
    geocode::GeocodeClient,
    history::{KeyValueStore, SearchHistoryStore},
    map::{MapEngine, MapLibrary},
    resolver::LocationResolver,
    search::SearchController,
    weather::WeatherProvider,
};
use std::sync::Arc;
use tracing::info;

/// Everything one user session needs, wired together.
///
/// The session owns the only [`MapEngine`]; [`Session::dispose`] tears the
/// components down in reverse order of construction.
#[derive(Debug)]
pub struct Session {
    geocoder: GeocodeClient,
    map: Arc<MapEngine>,
    resolver: Arc<LocationResolver>,
    search: SearchController,
}

impl Session {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        geocoder: GeocodeClient,
        library: Arc<dyn MapLibrary>,
        weather: Arc<dyn WeatherProvider>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let map = Arc::new(MapEngine::new(library, geocoder.clone(), catalog::all()));
        let resolver = Arc::new(LocationResolver::new(map.clone(), weather));
        let history = SearchHistoryStore::open(storage);
        let search = SearchController::new(geocoder.clone(), history, resolver.clone());

        Self { geocoder, map, resolver, search }
    }

    /// Loads the map library and builds the map inside `container`.
    pub async fn open_map(&self, container: &str) -> Result<(), MapError> {
        self.map.start(container).await
    }

    /// The geocoder shared by the map and the search box.
    pub fn geocoder(&self) -> &GeocodeClient {
        &self.geocoder
    }

    pub fn map(&self) -> &Arc<MapEngine> {
        &self.map
    }

    pub fn resolver(&self) -> &Arc<LocationResolver> {
        &self.resolver
    }

    pub fn search(&self) -> &SearchController {
        &self.search
    }

    pub fn dispose(&self) {
        self.search.dispose();
        self.resolver.dispose();
        self.map.dispose();
        info!("session disposed");
    }
}
