//! A map library with no display, for terminals and tests.

use super::{
    CameraTransition, LibraryEvent, LibraryEventSink, MapHandle, MapLibrary, MarkerId,
};
use crate::{
    error::MapError,
    model::{LngLat, MapViewState},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use tokio::task::JoinHandle;
use tracing::debug;

/// Clicks within this many degrees of a marker hit the marker.
pub const MARKER_HIT_RADIUS: f64 = 0.05;

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    map: Option<(MapHandle, LibraryEventSink)>,
    markers: HashMap<MarkerId, LngLat>,
    camera: MapViewState,
    flight: Option<JoinHandle<()>>,
}

/// Keeps a camera and marker set in memory and raises the same hooks a
/// real map would: ready right after construction, move-end when a
/// transition's duration has passed. A new transition interrupts the
/// running one, which then never reports its move-end.
#[derive(Debug, Default)]
pub struct HeadlessMap {
    load_failure: Option<String>,
    state: Mutex<HeadlessState>,
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library whose asset load always fails with `cause`.
    pub fn failing_load(cause: impl Into<String>) -> Self {
        Self { load_failure: Some(cause.into()), ..Self::default() }
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, event: LibraryEvent) -> bool {
        match &self.lock().map {
            Some((_, sink)) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulates a user click. Returns `false` when no map exists.
    pub fn click(&self, lat: f64, lng: f64) -> bool {
        let hit = {
            let state = self.lock();
            state
                .markers
                .iter()
                .find(|(_, at)| {
                    (at.lat - lat).abs() <= MARKER_HIT_RADIUS && (at.lng - lng).abs() <= MARKER_HIT_RADIUS
                })
                .map(|(id, _)| *id)
        };

        match hit {
            Some(marker) => self.send(LibraryEvent::MarkerClick(marker)),
            None => self.send(LibraryEvent::Click { lat, lng }),
        }
    }

    /// Simulates a style or runtime failure of the live map.
    pub fn raise_error(&self, message: impl Into<String>) -> bool {
        self.send(LibraryEvent::Error(message.into()))
    }

    pub fn camera(&self) -> MapViewState {
        self.lock().camera
    }

    pub fn marker_count(&self) -> usize {
        self.lock().markers.len()
    }

    pub fn has_map(&self) -> bool {
        self.lock().map.is_some()
    }
}

#[async_trait]
impl MapLibrary for HeadlessMap {
    async fn load(&self) -> Result<(), MapError> {
        match &self.load_failure {
            Some(cause) => Err(MapError::LibraryLoad(cause.clone())),
            None => Ok(()),
        }
    }

    fn create_map(
        &self,
        container: &str,
        view: MapViewState,
        events: LibraryEventSink,
    ) -> Result<MapHandle, MapError> {
        let mut state = self.lock();
        if state.map.is_some() {
            return Err(MapError::Runtime("a map already exists in this library".into()));
        }

        state.next_id += 1;
        let handle = MapHandle(state.next_id);
        state.camera = view;
        debug!(container, ?handle, "headless map created");

        // Nothing to fetch, so the map is usable straight away.
        let _ = events.send(LibraryEvent::MapReady);
        state.map = Some((handle, events));
        Ok(handle)
    }

    fn add_marker(&self, map: MapHandle, at: LngLat) -> Result<MarkerId, MapError> {
        let mut state = self.lock();
        if state.map.as_ref().map(|(h, _)| *h) != Some(map) {
            return Err(MapError::Runtime(format!("unknown map {map:?}")));
        }
        state.next_id += 1;
        let marker = MarkerId(state.next_id);
        state.markers.insert(marker, at);
        Ok(marker)
    }

    fn remove_marker(&self, marker: MarkerId) {
        self.lock().markers.remove(&marker);
    }

    fn fly_to(&self, map: MapHandle, transition: CameraTransition) -> Result<(), MapError> {
        let mut state = self.lock();
        let sink = match &state.map {
            Some((handle, sink)) if *handle == map => sink.clone(),
            _ => return Err(MapError::Runtime(format!("unknown map {map:?}"))),
        };
        state.camera = transition.target;

        let flight = tokio::spawn(async move {
            tokio::time::sleep(transition.duration).await;
            let _ = sink.send(LibraryEvent::MoveEnd(transition.target));
        });
        if let Some(interrupted) = state.flight.replace(flight) {
            interrupted.abort();
        }
        Ok(())
    }

    fn destroy(&self, map: MapHandle) {
        let mut state = self.lock();
        if state.map.as_ref().map(|(h, _)| *h) == Some(map) {
            state.map = None;
            state.markers.clear();
            if let Some(flight) = state.flight.take() {
                flight.abort();
            }
            debug!(?map, "headless map destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog,
        geocode::{GeocodeCandidate, GeocodeClient, Geocoder, ReverseCandidate},
        map::{LifecycleState, MapEngine, MapEvent},
        model::SelectionSource,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct NamedPoint;

    #[async_trait]
    impl Geocoder for NamedPoint {
        async fn search(&self, _q: &str, _l: usize) -> anyhow::Result<Vec<GeocodeCandidate>> {
            Ok(Vec::new())
        }

        async fn reverse(&self, _lat: f64, _lng: f64) -> anyhow::Result<Option<ReverseCandidate>> {
            Ok(Some(ReverseCandidate {
                name: Some("Atlantic Ocean".into()),
                display_name: "Atlantic Ocean".into(),
                country: Some("International Waters".into()),
            }))
        }
    }

    async fn started() -> (Arc<HeadlessMap>, MapEngine) {
        let library = Arc::new(HeadlessMap::new());
        let engine = MapEngine::new(
            library.clone(),
            GeocodeClient::new(Arc::new(NamedPoint)),
            catalog::all(),
        );
        engine.start("#map").await.unwrap();
        while !engine.is_ready() {
            tokio::task::yield_now().await;
        }
        (library, engine)
    }

    #[tokio::test]
    async fn engine_becomes_ready_with_markers() {
        let (library, engine) = started().await;
        assert_eq!(engine.lifecycle(), LifecycleState::Ready);
        assert_eq!(library.marker_count(), 20);
    }

    #[tokio::test]
    async fn click_near_marker_picks_catalog_city() {
        let (library, engine) = started().await;
        let mut sub = engine.subscribe();

        assert!(library.click(51.51, -0.13));
        match sub.events.recv().await.unwrap() {
            MapEvent::LocationPicked { location, source, .. } => {
                assert_eq!(source, SelectionSource::MapMarker);
                assert_eq!(location.name, "London");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn click_on_background_reverse_geocodes() {
        let (library, engine) = started().await;
        let mut sub = engine.subscribe();

        library.click(10.0, -30.0);
        match sub.events.recv().await.unwrap() {
            MapEvent::LocationPicked { location, source, .. } => {
                assert_eq!(source, SelectionSource::MapClick);
                assert_eq!(location.name, "Atlantic Ocean");
                assert_eq!(location.country, "International Waters");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fly_to_reports_move_end_after_duration() {
        let library = HeadlessMap::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let map = library.create_map("#map", MapViewState::HOME, tx).unwrap();
        assert_eq!(rx.recv().await, Some(LibraryEvent::MapReady));

        let target = MapViewState::new(2.35, 48.85, 10.0);
        library
            .fly_to(map, CameraTransition { target, duration: std::time::Duration::from_millis(2000) })
            .unwrap();
        assert_eq!(library.camera(), target);
        assert_eq!(rx.recv().await, Some(LibraryEvent::MoveEnd(target)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_flight_interrupts_running_one() {
        let library = HeadlessMap::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let map = library.create_map("#map", MapViewState::HOME, tx).unwrap();
        assert_eq!(rx.recv().await, Some(LibraryEvent::MapReady));

        let duration = std::time::Duration::from_millis(2000);
        let away = MapViewState::new(139.65, 35.68, 10.0);
        library.fly_to(map, CameraTransition { target: away, duration }).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        library.fly_to(map, CameraTransition { target: MapViewState::HOME, duration }).unwrap();

        assert_eq!(rx.recv().await, Some(LibraryEvent::MoveEnd(MapViewState::HOME)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn raised_error_fails_engine() {
        let (library, engine) = started().await;
        library.raise_error("style failed to load");
        while engine.failure().is_none() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(engine.lifecycle(), LifecycleState::Failed(_)));
    }

    #[tokio::test]
    async fn dispose_destroys_headless_map() {
        let (library, engine) = started().await;
        engine.dispose();
        assert!(!library.has_map());
        assert_eq!(library.marker_count(), 0);
    }
}
