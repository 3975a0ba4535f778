//! Turns every kind of pick into the one selected location.
//!
//! Each selection bumps a generation counter. Weather results carry the
//! generation they were requested for and are applied only while it is
//! still current, so a slow answer for an earlier pick can never overwrite
//! the detail view of a later one.

use crate::{
    catalog,
    error::MapError,
    map::{MapEngine, MapEvent, SubscriptionId},
    model::{Location, SelectionSource, WeatherReport},
    weather::WeatherProvider,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum DetailStatus {
    Loading,
    Loaded(WeatherReport),
    Failed(String),
}

/// The weather panel for the selected location.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailView {
    pub location: Location,
    pub status: DetailStatus,
    pub visible: bool,
}

#[derive(Debug, Default)]
struct ResolverState {
    generation: u64,
    selected: Option<Location>,
    detail: Option<DetailView>,
}

#[derive(Debug)]
struct Shared {
    map: Arc<MapEngine>,
    weather: Arc<dyn WeatherProvider>,
    state: Mutex<ResolverState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select(self: &Arc<Self>, location: Location, source: SelectionSource) -> u64 {
        let state = self.lock();
        self.commit(state, location, source)
    }

    /// Applies a pick from the map unless a later selection or map pick
    /// has happened since it was made.
    fn select_map_pick(self: &Arc<Self>, location: Location, source: SelectionSource, pick: u64) {
        let state = self.lock();
        let current = self.map.click_generation();
        if current != pick {
            debug!(name = %location.name, pick, current, "dropping superseded map pick");
            return;
        }
        self.commit(state, location, source);
    }

    fn commit(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, ResolverState>,
        location: Location,
        source: SelectionSource,
    ) -> u64 {
        // Any map click still being looked up now belongs to an older selection.
        self.map.supersede_picks();
        state.generation += 1;
        state.selected = Some(location.clone());
        state.detail = Some(DetailView {
            location: location.clone(),
            status: DetailStatus::Loading,
            visible: true,
        });
        let generation = state.generation;
        drop(state);
        info!(%source, name = %location.name, generation, "location selected");

        match self.map.fly_to(&location) {
            Ok(()) => {}
            Err(MapError::NotReady) => debug!("map not ready, skipping camera move"),
            Err(err) => warn!(error = %err, "camera move failed, keeping selection"),
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.weather.get_weather(&location).await;
            shared.apply_weather(generation, result.map_err(|e| e.to_string()));
        });

        generation
    }

    fn apply_weather(&self, generation: u64, result: Result<WeatherReport, String>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, current = state.generation, "dropping stale weather result");
            return false;
        }
        let Some(detail) = state.detail.as_mut() else {
            return false;
        };

        detail.status = match result {
            Ok(report) => DetailStatus::Loaded(report),
            Err(message) => {
                warn!(name = %detail.location.name, error = %message, "weather fetch failed");
                DetailStatus::Failed(message)
            }
        };
        true
    }

    fn clear(&self) {
        let mut state = self.lock();
        self.map.supersede_picks();
        state.generation += 1;
        state.selected = None;
        state.detail = None;
    }
}

/// Coordinates selection, camera movement and weather requests.
#[derive(Debug)]
pub struct LocationResolver {
    shared: Arc<Shared>,
    subscription: Mutex<Option<(SubscriptionId, JoinHandle<()>)>>,
}

impl LocationResolver {
    /// Creates the resolver and subscribes it to the map's picks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(map: Arc<MapEngine>, weather: Arc<dyn WeatherProvider>) -> Self {
        let sub = map.subscribe();
        let shared = Arc::new(Shared { map, weather, state: Mutex::new(ResolverState::default()) });

        let listener = Arc::downgrade(&shared);
        let mut events = sub.events;
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = listener.upgrade() else {
                    break;
                };
                if let MapEvent::LocationPicked { location, source, pick } = event {
                    shared.select_map_pick(location, source, pick);
                }
            }
        });

        Self { shared, subscription: Mutex::new(Some((sub.id, task))) }
    }

    /// Selects `location`; returns the generation of this selection.
    pub fn select(&self, location: Location, source: SelectionSource) -> u64 {
        self.shared.select(location, source)
    }

    /// Selects a catalog entry by id.
    pub fn select_catalog(&self, id: u32) -> Option<u64> {
        catalog::get(id).map(|location| self.select(location, SelectionSource::Catalog))
    }

    /// The reset action: animate home, drop the selection, hide the detail view.
    ///
    /// Returns `false` when the reset was coalesced into one in progress or
    /// the map could not move; the selection is kept in that case.
    pub fn reset_view(&self) -> bool {
        let started = match self.shared.map.reset() {
            Ok(started) => started,
            Err(err) => {
                debug!(error = %err, "map reset unavailable");
                false
            }
        };
        if started {
            self.shared.clear();
        }
        started
    }

    pub fn close_detail(&self) {
        if let Some(detail) = self.shared.lock().detail.as_mut() {
            detail.visible = false;
        }
    }

    pub fn selected(&self) -> Option<Location> {
        self.shared.lock().selected.clone()
    }

    pub fn detail(&self) -> Option<DetailView> {
        self.shared.lock().detail.clone()
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn map(&self) -> &Arc<MapEngine> {
        &self.shared.map
    }

    /// Stops listening to the map. Safe to repeat.
    pub fn dispose(&self) {
        let taken = self.subscription.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((id, task)) = taken {
            self.shared.map.unsubscribe(id);
            task.abort();
        }
    }
}

impl Drop for LocationResolver {
    fn drop(&mut self) {
        self.dispose();
    }
}
