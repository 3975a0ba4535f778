//! End-to-end flows through a whole session with a headless map.

use anyhow::anyhow;
use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use weathermap_core::{
    DetailStatus, DisplayItem, GeocodeClient, LifecycleState, Location, MemoryStore, Panel,
    Session, SyntheticWeather, WeatherFetchError, WeatherProvider, WeatherReport,
    geocode::{GeocodeCandidate, Geocoder, ReverseCandidate},
    map::{CAMERA_DURATION, headless::HeadlessMap},
    model::LocationId,
    search::SETTLE_DELAY,
};

/// Knows a handful of places by exact query. Reverse lookups fail unless
/// `reverse_after` is set, in which case every point is "Ocean" after that
/// delay.
#[derive(Debug, Default)]
struct ScriptedGeocoder {
    queries: Mutex<Vec<String>>,
    reverse_after: Option<Duration>,
}

const PLACES: &[(&str, &str, &str, f64, f64)] = &[
    ("London", "42", "United Kingdom", 51.5074, -0.1278),
    ("Lisbon", "43", "Portugal", 38.7223, -9.1393),
    ("Lima", "44", "Peru", -12.0464, -77.0428),
    ("Lyon", "45", "France", 45.764, 4.8357),
];

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn search(&self, query: &str, _limit: usize) -> anyhow::Result<Vec<GeocodeCandidate>> {
        self.queries.lock().unwrap().push(query.to_string());
        tokio::time::sleep(Duration::from_millis(80)).await;

        Ok(PLACES
            .iter()
            .filter(|p| p.0 == query)
            .map(|&(name, id, country, lat, lng)| GeocodeCandidate {
                place_id: Some(id.to_string()),
                name: Some(name.to_string()),
                display_name: format!("{name}, {country}"),
                country: Some(country.to_string()),
                lat,
                lng,
            })
            .collect())
    }

    async fn reverse(&self, _lat: f64, _lng: f64) -> anyhow::Result<Option<ReverseCandidate>> {
        let Some(delay) = self.reverse_after else {
            return Err(anyhow!("503 Service Unavailable"));
        };
        tokio::time::sleep(delay).await;
        Ok(Some(ReverseCandidate {
            name: Some("Ocean".into()),
            display_name: "Ocean, International Waters".into(),
            country: Some("International Waters".into()),
        }))
    }
}

/// Synthetic weather whose latency depends on the location.
#[derive(Debug)]
struct LaggyWeather;

#[async_trait]
impl WeatherProvider for LaggyWeather {
    async fn get_weather(&self, location: &Location) -> Result<WeatherReport, WeatherFetchError> {
        let delay = match location.name.as_str() {
            "Tokyo" => 4000,
            _ => 1000,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(SyntheticWeather::default().report_at(location, chrono::Utc::now()))
    }
}

struct Harness {
    geocoder: Arc<ScriptedGeocoder>,
    library: Arc<HeadlessMap>,
    session: Session,
}

impl Harness {
    fn new() -> Self {
        Self::with_geocoder(ScriptedGeocoder::default())
    }

    fn with_geocoder(geocoder: ScriptedGeocoder) -> Self {
        let geocoder = Arc::new(geocoder);
        let library = Arc::new(HeadlessMap::new());
        let session = Session::new(
            GeocodeClient::new(geocoder.clone()),
            library.clone(),
            Arc::new(LaggyWeather),
            Arc::new(MemoryStore::new()),
        );
        Self { geocoder, library, session }
    }

    async fn with_ready_map() -> Self {
        Self::ready(Self::new()).await
    }

    async fn ready(harness: Self) -> Self {
        harness.session.open_map("#map").await.unwrap();
        while !harness.session.map().is_ready() {
            tokio::task::yield_now().await;
        }
        harness
    }

    fn sent(&self) -> Vec<String> {
        self.geocoder.queries.lock().unwrap().clone()
    }

    async fn pick(&self, query: &str) {
        let search = self.session.search();
        search.input(query);
        settle().await;
        let item = search.display_list().into_iter().find(|i| !i.is_history()).unwrap();
        search.select(&item);
    }
}

async fn settle() {
    tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(150)).await;
}

#[tokio::test(start_paused = true)]
async fn typing_lon_then_london_sends_one_request() {
    let h = Harness::new();
    h.session.search().input("Lon");
    tokio::time::sleep(Duration::from_millis(120)).await;
    h.session.search().input("London");
    settle().await;

    assert_eq!(h.sent(), vec!["London"]);
    assert_eq!(h.session.search().panel(), Panel::Results);
    assert_eq!(h.session.search().results()[0].id(), "42");
}

#[tokio::test(start_paused = true)]
async fn typing_one_letter_sends_nothing() {
    let h = Harness::new();
    h.session.search().input("L");
    settle().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(h.sent().is_empty());
    assert_eq!(h.session.search().panel(), Panel::Hidden);
}

#[tokio::test(start_paused = true)]
async fn reselecting_history_entry_moves_it_to_front() {
    let h = Harness::new();
    for query in ["London", "Lisbon", "Lima"] {
        h.pick(query).await;
    }
    let ids = |h: &Harness| -> Vec<String> {
        h.session.search().history().iter().map(|e| e.id().to_string()).collect()
    };
    assert_eq!(ids(&h), vec!["44", "43", "42"]);

    let search = h.session.search();
    search.focus();
    assert_eq!(search.panel(), Panel::History);
    let item = search
        .display_list()
        .into_iter()
        .find(|i| i.entry().id() == "42")
        .unwrap();
    assert!(matches!(item, DisplayItem::History(_)));
    search.select(&item);

    assert_eq!(ids(&h), vec!["42", "44", "43"]);
    assert_eq!(h.session.resolver().selected().unwrap().name, "London");
}

#[tokio::test(start_paused = true)]
async fn catalog_and_map_picks_never_enter_history() {
    let h = Harness::with_ready_map().await;
    h.session.resolver().select_catalog(5).unwrap();
    h.library.click(-33.8688, 151.2093);
    h.library.click(0.5, 0.5);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.session.search().history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn map_click_with_failed_reverse_geocode_opens_fallback_location() {
    let h = Harness::with_ready_map().await;

    // London's marker sits within the hit radius of this point.
    assert!(h.library.click(51.5, -0.12));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let selected = h.session.resolver().selected().unwrap();
    assert_eq!(selected.name, "London");

    assert!(h.library.click(51.5, -0.3));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let detail = h.session.resolver().detail().unwrap();
    assert!(detail.visible);
    assert_eq!(detail.location.id, LocationId::AdHoc);
    assert_eq!(detail.location.name, "Location (51.50, -0.30)");
    assert!(h.session.map().has_moved_from_home());
}

#[tokio::test(start_paused = true)]
async fn list_pick_beats_slower_map_click() {
    let slow = ScriptedGeocoder { reverse_after: Some(Duration::from_secs(2)), ..Default::default() };
    let h = Harness::ready(Harness::with_geocoder(slow)).await;
    let resolver = h.session.resolver();

    assert!(h.library.click(0.5, -30.0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    resolver.select_catalog(4).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(resolver.selected().unwrap().name, "Paris");
    assert_eq!(resolver.detail().unwrap().location.name, "Paris");
}

#[tokio::test(start_paused = true)]
async fn search_pick_and_reset_beat_slower_map_click() {
    let slow = ScriptedGeocoder { reverse_after: Some(Duration::from_secs(2)), ..Default::default() };
    let h = Harness::ready(Harness::with_geocoder(slow)).await;
    let resolver = h.session.resolver();

    assert!(h.library.click(0.5, -30.0));
    h.pick("Lisbon").await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(resolver.selected().unwrap().name, "Lisbon");

    assert!(h.library.click(-10.0, -20.0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(resolver.reset_view());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(resolver.selected().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_map_click_applies_when_nothing_else_happens() {
    let slow = ScriptedGeocoder { reverse_after: Some(Duration::from_secs(2)), ..Default::default() };
    let h = Harness::ready(Harness::with_geocoder(slow)).await;

    assert!(h.library.click(0.5, -30.0));
    tokio::time::sleep(Duration::from_secs(3)).await;
    let selected = h.session.resolver().selected().unwrap();
    assert_eq!((selected.name.as_str(), selected.id.clone()), ("Ocean", LocationId::AdHoc));
}

#[tokio::test(start_paused = true)]
async fn session_geocoder_resolves_clicked_points() {
    let slow = ScriptedGeocoder { reverse_after: Some(Duration::from_millis(10)), ..Default::default() };
    let h = Harness::with_geocoder(slow);

    let location = h.session.geocoder().locate_point(0.5, -30.0).await;
    assert_eq!((location.name.as_str(), location.country.as_str()), ("Ocean", "International Waters"));
}

#[tokio::test(start_paused = true)]
async fn map_click_fallback_label_matches_format_without_markers() {
    let geocoder = Arc::new(ScriptedGeocoder::default());
    let library = Arc::new(HeadlessMap::new());
    let map = Arc::new(weathermap_core::MapEngine::new(
        library.clone(),
        GeocodeClient::new(geocoder),
        Vec::new(),
    ));
    let resolver = weathermap_core::LocationResolver::new(map.clone(), Arc::new(LaggyWeather));
    map.start("#map").await.unwrap();
    while !map.is_ready() {
        tokio::task::yield_now().await;
    }

    library.click(51.5, -0.12);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(resolver.detail().unwrap().location.name, "Location (51.50, -0.12)");
}

#[tokio::test(start_paused = true)]
async fn later_selection_wins_over_slow_earlier_weather() {
    let h = Harness::with_ready_map().await;
    let resolver = h.session.resolver();

    resolver.select_catalog(3).unwrap(); // Tokyo, 4 s
    tokio::time::sleep(Duration::from_millis(200)).await;
    resolver.select_catalog(4).unwrap(); // Paris, 1 s

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let loaded_for = |status: DetailStatus| match status {
        DetailStatus::Loaded(report) => report.location_name,
        other => panic!("unexpected status {other:?}"),
    };
    assert_eq!(loaded_for(resolver.detail().unwrap().status), "Paris, France");

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(loaded_for(resolver.detail().unwrap().status), "Paris, France");
    assert_eq!(resolver.selected().unwrap().name, "Paris");
}

#[tokio::test(start_paused = true)]
async fn reset_twice_within_window_is_a_single_reset() {
    let h = Harness::with_ready_map().await;
    let resolver = h.session.resolver();
    let map = h.session.map();

    resolver.select_catalog(2).unwrap();
    assert!(map.has_moved_from_home());

    assert!(resolver.reset_view());
    assert!(resolver.selected().is_none());
    assert!(resolver.detail().is_none());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!resolver.reset_view());
    assert!(map.has_moved_from_home());

    tokio::time::sleep(CAMERA_DURATION).await;
    assert!(!map.has_moved_from_home());
    assert!(!map.is_resetting());
    assert!(resolver.reset_view());
}

#[tokio::test(start_paused = true)]
async fn selection_works_while_map_failed_to_load() {
    let library = Arc::new(HeadlessMap::failing_load("script blocked"));
    let session = Session::new(
        GeocodeClient::new(Arc::new(ScriptedGeocoder::default())),
        library,
        Arc::new(LaggyWeather),
        Arc::new(MemoryStore::new()),
    );

    let err = session.open_map("#map").await.unwrap_err();
    assert!(err.to_string().contains("script blocked"));
    assert!(matches!(session.map().lifecycle(), LifecycleState::Failed(_)));

    session.resolver().select_catalog(1).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(matches!(session.resolver().detail().unwrap().status, DetailStatus::Loaded(_)));
}

#[tokio::test(start_paused = true)]
async fn dispose_tears_down_map() {
    let h = Harness::with_ready_map().await;
    assert_eq!(h.library.marker_count(), 20);

    h.session.dispose();
    assert!(!h.library.has_map());
    assert_eq!(h.library.marker_count(), 0);
    assert!(!h.library.click(10.0, 10.0));
}
