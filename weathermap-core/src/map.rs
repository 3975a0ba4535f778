//! Lifecycle and command surface of the interactive map.
//!
//! The [`MapEngine`] owns the one map instance of a session and every marker
//! placed on it. The map library itself sits behind [`MapLibrary`]; its event
//! hooks arrive on a [`LibraryEventSink`] handed over at construction, and the
//! engine republishes what matters to subscribers as [`MapEvent`]s.

use crate::{
    error::MapError,
    geocode::GeocodeClient,
    model::{LngLat, Location, MapViewState, SelectionSource, is_valid_coordinate},
};
use async_trait::async_trait;
use std::{
    fmt,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

pub mod headless;

/// Zoom used when focusing a single location.
pub const FOCUSED_ZOOM: f64 = 10.0;

/// Duration of every animated camera transition.
pub const CAMERA_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Unloaded,
    LibraryLoading,
    LibraryLoaded,
    Initializing,
    Ready,
    /// Terminal. Holds a human-readable cause.
    Failed(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unloaded => f.write_str("unloaded"),
            LifecycleState::LibraryLoading => f.write_str("library-loading"),
            LifecycleState::LibraryLoaded => f.write_str("library-loaded"),
            LifecycleState::Initializing => f.write_str("initializing"),
            LifecycleState::Ready => f.write_str("ready"),
            LifecycleState::Failed(cause) => write!(f, "failed ({cause})"),
        }
    }
}

/// Library-side handle of a constructed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapHandle(pub u64);

/// Library-side handle of a placed marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransition {
    pub target: MapViewState,
    pub duration: Duration,
}

/// Hooks raised by the map library.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    /// Style and tiles are usable.
    MapReady,
    /// Click on the map background.
    Click { lat: f64, lng: f64 },
    /// Click on a marker. Libraries must not also raise `Click` for it.
    MarkerClick(MarkerId),
    /// Camera came to rest.
    MoveEnd(MapViewState),
    /// Style or runtime failure.
    Error(String),
}

pub type LibraryEventSink = mpsc::UnboundedSender<LibraryEvent>;

/// An interactive map library.
#[async_trait]
pub trait MapLibrary: Send + Sync + Debug {
    /// Loads the library's assets.
    async fn load(&self) -> Result<(), MapError>;

    /// Builds a map bound to `container`. Hooks are delivered on `events`.
    fn create_map(
        &self,
        container: &str,
        view: MapViewState,
        events: LibraryEventSink,
    ) -> Result<MapHandle, MapError>;

    fn add_marker(&self, map: MapHandle, at: LngLat) -> Result<MarkerId, MapError>;

    fn remove_marker(&self, marker: MarkerId);

    /// Starts an animated camera transition.
    fn fly_to(&self, map: MapHandle, transition: CameraTransition) -> Result<(), MapError>;

    fn destroy(&self, map: MapHandle);
}

/// What the engine publishes to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Lifecycle(LifecycleState),
    /// `pick` is the click generation the pick was made under. It is stale
    /// once [`MapEngine::click_generation`] has moved past it.
    LocationPicked { location: Location, source: SelectionSource, pick: u64 },
    CameraChanged { view: MapViewState, moved_from_home: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug)]
pub struct MapSubscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<MapEvent>,
}

#[derive(Debug, Default)]
struct EngineState {
    lifecycle: LifecycleState,
    failure: Option<MapError>,
    map: Option<MapHandle>,
    markers: Vec<(MarkerId, Location)>,
    view: MapViewState,
    resetting: bool,
    // Bumped by every fly_to; a reset only snaps home if nothing flew since.
    camera_epoch: u64,
    click_generation: u64,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<MapEvent>)>,
    next_subscription: u64,
    tasks: Vec<JoinHandle<()>>,
    disposed: bool,
}

impl EngineState {
    fn emit(&mut self, event: MapEvent) {
        self.subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn set_lifecycle(&mut self, next: LifecycleState) {
        info!(from = %self.lifecycle, to = %next, "map lifecycle transition");
        self.lifecycle = next.clone();
        self.emit(MapEvent::Lifecycle(next));
    }

    fn fail(&mut self, err: MapError) {
        if self.disposed || matches!(self.lifecycle, LifecycleState::Failed(_)) {
            return;
        }
        error!(error = %err, state = %self.lifecycle, "map failed");
        self.set_lifecycle(LifecycleState::Failed(err.to_string()));
        self.failure = Some(err);
    }

    fn ready_map(&self) -> Result<MapHandle, MapError> {
        match (&self.lifecycle, self.map) {
            (LifecycleState::Ready, Some(map)) if !self.disposed => Ok(map),
            _ => Err(MapError::NotReady),
        }
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    fn camera_changed(&mut self) {
        let view = self.view;
        self.emit(MapEvent::CameraChanged { view, moved_from_home: view.has_moved_from_home() });
    }
}

#[derive(Debug)]
struct Shared {
    library: Arc<dyn MapLibrary>,
    geocoder: GeocodeClient,
    catalog: Vec<Location>,
    state: Mutex<EngineState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle_library_event(self: &Arc<Self>, event: LibraryEvent) {
        let mut state = self.lock();
        if state.disposed || matches!(state.lifecycle, LifecycleState::Failed(_)) {
            debug!(?event, "ignoring map event after failure or disposal");
            return;
        }

        match event {
            LibraryEvent::MapReady => self.on_map_ready(&mut state),
            LibraryEvent::Error(message) => state.fail(MapError::Runtime(message)),
            _ if state.lifecycle != LifecycleState::Ready => {
                debug!(?event, state = %state.lifecycle, "ignoring map event before ready");
            }
            LibraryEvent::MarkerClick(marker) => {
                let Some(location) =
                    state.markers.iter().find(|(id, _)| *id == marker).map(|(_, l)| l.clone())
                else {
                    warn!(?marker, "click on unknown marker");
                    return;
                };
                debug!(name = %location.name, "marker clicked");
                // Supersedes any background click still being looked up.
                state.click_generation += 1;
                let pick = state.click_generation;
                state.emit(MapEvent::LocationPicked { location, source: SelectionSource::MapMarker, pick });
            }
            LibraryEvent::Click { lat, lng } => {
                if !is_valid_coordinate(lat, lng) {
                    warn!(lat, lng, "map click outside valid coordinates");
                    return;
                }
                debug!(lat, lng, "map clicked");
                state.click_generation += 1;
                let generation = state.click_generation;
                let shared = Arc::clone(self);
                let task = tokio::spawn(async move { shared.resolve_click(generation, lat, lng).await });
                state.track(task);
            }
            LibraryEvent::MoveEnd(view) => {
                if state.resetting {
                    debug!("camera moved during reset, waiting for reset window");
                    return;
                }
                state.view = view;
                state.camera_changed();
            }
        }
    }

    fn on_map_ready(&self, state: &mut EngineState) {
        if state.lifecycle != LifecycleState::Initializing {
            debug!(state = %state.lifecycle, "duplicate map ready signal");
            return;
        }
        let Some(map) = state.map else {
            return;
        };

        for location in &self.catalog {
            match self.library.add_marker(map, LngLat { lng: location.lng, lat: location.lat }) {
                Ok(marker) => state.markers.push((marker, location.clone())),
                Err(err) => warn!(name = %location.name, error = %err, "failed to place marker"),
            }
        }
        info!(markers = state.markers.len(), "map ready");
        state.set_lifecycle(LifecycleState::Ready);
    }

    async fn resolve_click(self: Arc<Self>, generation: u64, lat: f64, lng: f64) {
        let location = self.geocoder.locate_point(lat, lng).await;

        let mut state = self.lock();
        if state.disposed || state.click_generation != generation {
            debug!(lat, lng, "dropping superseded map click");
            return;
        }
        state.emit(MapEvent::LocationPicked {
            location,
            source: SelectionSource::MapClick,
            pick: generation,
        });
    }

    fn finish_reset(&self, epoch: u64) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        state.resetting = false;
        if state.camera_epoch == epoch {
            state.view = MapViewState::HOME;
        }
        debug!(moved = state.view.has_moved_from_home(), "reset window elapsed");
        state.camera_changed();
    }
}

async fn pump_events(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<LibraryEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_library_event(event);
    }
}

/// Owner of the session's map instance.
#[derive(Debug)]
pub struct MapEngine {
    shared: Arc<Shared>,
}

impl MapEngine {
    /// `catalog` gets one marker each once the map is ready.
    pub fn new(library: Arc<dyn MapLibrary>, geocoder: GeocodeClient, catalog: Vec<Location>) -> Self {
        Self {
            shared: Arc::new(Shared {
                library,
                geocoder,
                catalog,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Loads the library and constructs the map.
    ///
    /// Load failures are terminal; nothing is retried. Calling this again
    /// after a successful start does nothing.
    pub async fn start(&self, container: &str) -> Result<(), MapError> {
        {
            let mut state = self.shared.lock();
            if state.disposed {
                return Err(MapError::NotReady);
            }
            match &state.lifecycle {
                LifecycleState::Unloaded => state.set_lifecycle(LifecycleState::LibraryLoading),
                LifecycleState::Failed(_) => {
                    return Err(state.failure.clone().unwrap_or(MapError::NotReady));
                }
                other => {
                    debug!(state = %other, "map already started");
                    return Ok(());
                }
            }
        }

        if let Err(err) = self.shared.library.load().await {
            let err = match err {
                MapError::LibraryLoad(_) => err,
                other => MapError::LibraryLoad(other.to_string()),
            };
            self.shared.lock().fail(err.clone());
            return Err(err);
        }

        {
            let mut state = self.shared.lock();
            if state.disposed {
                return Err(MapError::NotReady);
            }
            state.set_lifecycle(LifecycleState::LibraryLoaded);
        }

        self.initialize(container)
    }

    /// Constructs the map at the home view. At most once per engine.
    pub fn initialize(&self, container: &str) -> Result<(), MapError> {
        let mut state = self.shared.lock();
        if state.map.is_some() {
            debug!("map already constructed");
            return Ok(());
        }
        if state.lifecycle != LifecycleState::LibraryLoaded || state.disposed {
            return Err(MapError::NotReady);
        }

        let (sink, events) = mpsc::unbounded_channel();
        match self.shared.library.create_map(container, MapViewState::HOME, sink) {
            Ok(map) => {
                state.map = Some(map);
                state.view = MapViewState::HOME;
                state.set_lifecycle(LifecycleState::Initializing);
                let pump = tokio::spawn(pump_events(Arc::downgrade(&self.shared), events));
                state.track(pump);
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    MapError::Runtime(_) => err,
                    other => MapError::Runtime(other.to_string()),
                };
                state.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Feeds one library hook into the engine, as the library's sink does.
    pub fn handle_library_event(&self, event: LibraryEvent) {
        self.shared.handle_library_event(event);
    }

    /// Flies to `location` at [`FOCUSED_ZOOM`]. The view counts as moved
    /// as soon as the transition starts.
    pub fn fly_to(&self, location: &Location) -> Result<(), MapError> {
        let mut state = self.shared.lock();
        let map = state.ready_map()?;
        let target = MapViewState::new(location.lng, location.lat, FOCUSED_ZOOM);

        self.shared
            .library
            .fly_to(map, CameraTransition { target, duration: CAMERA_DURATION })
            .inspect_err(|err| warn!(error = %err, name = %location.name, "fly to failed"))?;

        debug!(name = %location.name, lat = location.lat, lng = location.lng, "flying to location");
        state.view = target;
        state.camera_epoch += 1;
        state.camera_changed();
        Ok(())
    }

    /// Animates back to the home view.
    ///
    /// Returns `Ok(false)` when a reset is already running; the view only
    /// reads as home once [`CAMERA_DURATION`] has elapsed.
    pub fn reset(&self) -> Result<bool, MapError> {
        let mut state = self.shared.lock();
        let map = state.ready_map()?;
        if state.resetting {
            debug!("reset already in progress");
            return Ok(false);
        }

        self.shared
            .library
            .fly_to(map, CameraTransition { target: MapViewState::HOME, duration: CAMERA_DURATION })
            .inspect_err(|err| warn!(error = %err, "reset failed"))?;

        info!("resetting map to home view");
        state.resetting = true;
        let epoch = state.camera_epoch;
        let shared = Arc::downgrade(&self.shared);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(CAMERA_DURATION).await;
            if let Some(shared) = shared.upgrade() {
                shared.finish_reset(epoch);
            }
        });
        state.track(timer);
        Ok(true)
    }

    /// Marks every map pick made so far as stale, including background
    /// clicks still being reverse geocoded.
    pub fn supersede_picks(&self) {
        self.shared.lock().click_generation += 1;
    }

    /// Generation of the latest map pick or supersession.
    pub fn click_generation(&self) -> u64 {
        self.shared.lock().click_generation
    }

    pub fn subscribe(&self) -> MapSubscription {
        let mut state = self.shared.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;

        let (tx, events) = mpsc::unbounded_channel();
        if !state.disposed {
            state.subscribers.push((id, tx));
        }
        MapSubscription { id, events }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.lock().subscribers.retain(|(sub, _)| *sub != id);
    }

    /// Destroys the map and releases every marker. Safe at any point of the
    /// lifecycle and safe to repeat.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;

        for (marker, _) in state.markers.drain(..) {
            self.shared.library.remove_marker(marker);
        }
        if let Some(map) = state.map.take() {
            self.shared.library.destroy(map);
        }
        for task in state.tasks.drain(..) {
            task.abort();
        }
        state.resetting = false;
        state.subscribers.clear();
        info!("map engine disposed");
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.lock().lifecycle.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().ready_map().is_ok()
    }

    /// Cause of the terminal failure, if any.
    pub fn failure(&self) -> Option<MapError> {
        self.shared.lock().failure.clone()
    }

    pub fn view(&self) -> MapViewState {
        self.shared.lock().view
    }

    pub fn has_moved_from_home(&self) -> bool {
        self.view().has_moved_from_home()
    }

    pub fn is_resetting(&self) -> bool {
        self.shared.lock().resetting
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Locations that currently carry a marker.
    pub fn marked_locations(&self) -> Vec<Location> {
        self.shared.lock().markers.iter().map(|(_, l)| l.clone()).collect()
    }
}

impl Drop for MapEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
