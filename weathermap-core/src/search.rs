//! Debounced free-text search over the geocoder, merged with history.
//!
//! Every keystroke bumps the query generation and restarts the settle timer.
//! Only a timer whose generation is still current may submit its query, and
//! only results whose generation is still current are shown.

use crate::{
    catalog,
    geocode::GeocodeClient,
    history::SearchHistoryStore,
    model::{HistoryEntry, Location, SearchResult, SelectionSource},
    resolver::LocationResolver,
};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Quiet period after the last keystroke before a query is submitted.
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Shorter queries never reach the geocoder.
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Pending,
    Resolved,
}

/// Which dropdown is showing. The two are never shown together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Hidden,
    History,
    Results,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    History(HistoryEntry),
    Result(SearchResult),
}

impl DisplayItem {
    pub fn entry(&self) -> &SearchResult {
        match self {
            DisplayItem::History(entry) => entry,
            DisplayItem::Result(result) => result,
        }
    }

    pub fn is_history(&self) -> bool {
        matches!(self, DisplayItem::History(_))
    }
}

#[derive(Debug)]
struct SearchState {
    query: String,
    generation: u64,
    phase: SearchPhase,
    loading: bool,
    results: Vec<SearchResult>,
    results_visible: bool,
    history_visible: bool,
    history: SearchHistoryStore,
    timer: Option<JoinHandle<()>>,
}

impl SearchState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.results_visible = false;
        self.loading = false;
        self.phase = SearchPhase::Idle;
    }
}

#[derive(Debug)]
struct Shared {
    geocoder: GeocodeClient,
    settle_delay: Duration,
    state: Mutex<SearchState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_search(&self, generation: u64) {
        let query = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.loading = true;
            state.query.trim().to_string()
        };

        debug!(%query, generation, "submitting search");
        let results = self.geocoder.search(&query).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!(%query, generation, current = state.generation, "dropping stale search results");
            return;
        }
        state.loading = false;
        state.results = results;
        state.results_visible = true;
        state.phase = SearchPhase::Resolved;
    }
}

fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_CHARS
}

/// Drives the search box: debouncing, panels and selection.
#[derive(Debug)]
pub struct SearchController {
    shared: Arc<Shared>,
    resolver: Arc<LocationResolver>,
}

impl SearchController {
    pub fn new(
        geocoder: GeocodeClient,
        history: SearchHistoryStore,
        resolver: Arc<LocationResolver>,
    ) -> Self {
        Self::with_settle_delay(geocoder, history, resolver, SETTLE_DELAY)
    }

    pub fn with_settle_delay(
        geocoder: GeocodeClient,
        history: SearchHistoryStore,
        resolver: Arc<LocationResolver>,
        settle_delay: Duration,
    ) -> Self {
        let state = SearchState {
            query: String::new(),
            generation: 0,
            phase: SearchPhase::Idle,
            loading: false,
            results: Vec::new(),
            results_visible: false,
            history_visible: false,
            history,
            timer: None,
        };

        Self {
            shared: Arc::new(Shared { geocoder, settle_delay, state: Mutex::new(state) }),
            resolver,
        }
    }

    /// Replaces the query text, as one keystroke does.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn input(&self, text: impl Into<String>) {
        let mut state = self.shared.lock();
        state.query = text.into();
        state.generation += 1;
        state.cancel_timer();

        if !is_searchable(&state.query) {
            state.clear_results();
            return;
        }

        state.phase = SearchPhase::Pending;
        state.loading = false;
        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        let delay = self.shared.settle_delay;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.run_search(generation).await;
        }));
    }

    /// Submits the pending query now instead of waiting for the settle timer.
    ///
    /// When the timer already fired and its request is in flight, no second
    /// request is sent; this waits for the running one instead.
    pub async fn submit(&self) {
        let (generation, in_flight) = {
            let mut state = self.shared.lock();
            if !is_searchable(&state.query) {
                return;
            }
            if state.loading {
                debug!(generation = state.generation, "search already in flight");
                (None, state.timer.take())
            } else {
                state.cancel_timer();
                state.phase = SearchPhase::Pending;
                (Some(state.generation), None)
            }
        };

        if let Some(task) = in_flight {
            // Aborted only when a newer query replaced this one.
            let _ = task.await;
        } else if let Some(generation) = generation {
            self.shared.run_search(generation).await;
        }
    }

    /// The search box gained focus.
    pub fn focus(&self) {
        let mut state = self.shared.lock();
        if state.query.trim().is_empty() && !state.results_visible && !state.history.is_empty() {
            state.history_visible = true;
        }
    }

    pub fn panel(&self) -> Panel {
        let state = self.shared.lock();
        if state.results_visible && !state.results.is_empty() {
            Panel::Results
        } else if state.history_visible && !state.history.is_empty() {
            Panel::History
        } else {
            Panel::Hidden
        }
    }

    /// Items in display order: history first when it was opened, then live
    /// results in provider order.
    pub fn display_list(&self) -> Vec<DisplayItem> {
        let panel = self.panel();
        let state = self.shared.lock();

        let history = state.history.entries().iter().cloned().map(DisplayItem::History);
        match panel {
            Panel::Hidden => Vec::new(),
            Panel::History => history.collect(),
            Panel::Results if state.history_visible => {
                history.chain(state.results.iter().cloned().map(DisplayItem::Result)).collect()
            }
            Panel::Results => state.results.iter().cloned().map(DisplayItem::Result).collect(),
        }
    }

    /// Picks a displayed item: records it in history, clears the box and
    /// hands the location to the resolver.
    pub fn select(&self, item: &DisplayItem) -> Location {
        let entry = item.entry().clone();
        let location = entry.to_location();
        {
            let mut state = self.shared.lock();
            state.history.add(entry);
            state.query.clear();
            state.generation += 1;
            state.cancel_timer();
            state.clear_results();
            state.history_visible = false;
        }

        let source = if item.is_history() { SelectionSource::History } else { SelectionSource::Search };
        info!(name = %location.name, %source, "search item selected");
        self.resolver.select(location.clone(), source);
        location
    }

    pub fn remove_history(&self, id: &str) {
        let mut state = self.shared.lock();
        state.history.remove(id);
        if state.history.is_empty() {
            state.history_visible = false;
        }
    }

    pub fn clear_history(&self) {
        let mut state = self.shared.lock();
        state.history.clear();
        state.history_visible = false;
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.shared.lock().history.entries().to_vec()
    }

    pub fn results(&self) -> Vec<SearchResult> {
        self.shared.lock().results.clone()
    }

    pub fn query(&self) -> String {
        self.shared.lock().query.clone()
    }

    pub fn phase(&self) -> SearchPhase {
        self.shared.lock().phase
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    /// Catalog entries matching the current query, for the list view.
    pub fn catalog_matches(&self) -> Vec<Location> {
        catalog::filter(&self.query())
    }

    /// Cancels any pending timer. In-flight results are discarded.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.loading = false;
        state.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::WeatherFetchError,
        geocode::{GeocodeCandidate, Geocoder, ReverseCandidate},
        history::MemoryStore,
        map::{MapEngine, headless::HeadlessMap},
        model::WeatherReport,
        weather::WeatherProvider,
    };
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct CountingGeocoder {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn search(&self, query: &str, _l: usize) -> anyhow::Result<Vec<GeocodeCandidate>> {
            self.queries.lock().unwrap().push(query.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(vec![GeocodeCandidate {
                place_id: Some(format!("{}", query.len())),
                name: Some(query.to_string()),
                display_name: format!("{query}, Somewhere"),
                country: Some("Somewhere".into()),
                lat: 1.0,
                lng: 2.0,
            }])
        }

        async fn reverse(&self, _lat: f64, _lng: f64) -> anyhow::Result<Option<ReverseCandidate>> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct NeverWeather;

    #[async_trait]
    impl WeatherProvider for NeverWeather {
        async fn get_weather(&self, _l: &Location) -> Result<WeatherReport, WeatherFetchError> {
            Err(WeatherFetchError("offline".into()))
        }
    }

    fn controller() -> (Arc<CountingGeocoder>, SearchController, Arc<LocationResolver>) {
        let geocoder = Arc::new(CountingGeocoder::default());
        let client = GeocodeClient::new(geocoder.clone());
        let map = Arc::new(MapEngine::new(Arc::new(HeadlessMap::new()), client.clone(), Vec::new()));
        let resolver = Arc::new(LocationResolver::new(map, Arc::new(NeverWeather)));
        let history = SearchHistoryStore::open(Arc::new(MemoryStore::new()));
        (geocoder, SearchController::new(client, history, resolver.clone()), resolver)
    }

    fn sent(geocoder: &CountingGeocoder) -> Vec<String> {
        geocoder.queries.lock().unwrap().clone()
    }

    async fn settle() {
        tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(200)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_keystrokes_sends_one_request() {
        let (geocoder, search, _) = controller();
        for text in ["L", "Lo", "Lon", "Lond", "Londo", "London"] {
            search.input(text);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        settle().await;

        assert_eq!(sent(&geocoder), vec!["London"]);
        assert_eq!(search.phase(), SearchPhase::Resolved);
        assert_eq!(search.panel(), Panel::Results);
    }

    #[tokio::test(start_paused = true)]
    async fn single_character_never_searches() {
        let (geocoder, search, _) = controller();
        search.input("L");
        settle().await;

        assert!(sent(&geocoder).is_empty());
        assert_eq!(search.phase(), SearchPhase::Idle);
        assert_eq!(search.panel(), Panel::Hidden);
    }

    #[tokio::test(start_paused = true)]
    async fn shrinking_below_minimum_clears_results_immediately() {
        let (geocoder, search, _) = controller();
        search.input("Paris");
        settle().await;
        assert_eq!(search.results().len(), 1);

        search.input("P");
        assert!(search.results().is_empty());
        assert_eq!(search.panel(), Panel::Hidden);
        assert_eq!(sent(&geocoder).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_results_for_old_query_are_discarded() {
        let (geocoder, search, _) = controller();
        search.input("Rome");
        // Timer fired, request in flight for 100 ms.
        tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(50)).await;
        search.input("Ro");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(search.results().is_empty());

        settle().await;
        assert_eq!(sent(&geocoder), vec!["Rome", "Ro"]);
        assert_eq!(search.results()[0].name(), "Ro");
    }

    #[tokio::test(start_paused = true)]
    async fn submit_skips_the_settle_timer() {
        let (geocoder, search, _) = controller();
        search.input("Oslo");
        search.submit().await;
        assert_eq!(search.results().len(), 1);

        settle().await;
        assert_eq!(sent(&geocoder), vec!["Oslo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_while_request_in_flight_sends_nothing_new() {
        let (geocoder, search, _) = controller();
        search.input("London");
        // Timer fired, request in flight for 100 ms.
        tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(50)).await;
        assert!(search.is_loading());

        search.submit().await;
        assert_eq!(search.results().len(), 1);
        assert!(!search.is_loading());

        settle().await;
        assert_eq!(sent(&geocoder), vec!["London"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_submit_sends_one_request() {
        let (geocoder, search, _) = controller();
        search.input("Oslo");
        tokio::join!(search.submit(), search.submit());

        assert_eq!(search.results().len(), 1);
        assert_eq!(sent(&geocoder), vec!["Oslo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_records_history_and_resets_box() {
        let (_geocoder, search, resolver) = controller();
        search.input("Lima");
        settle().await;

        let item = search.display_list().remove(0);
        let location = search.select(&item);

        assert_eq!(location.name, "Lima");
        assert_eq!(search.query(), "");
        assert_eq!(search.panel(), Panel::Hidden);
        assert_eq!(search.history().len(), 1);
        assert_eq!(resolver.selected().unwrap().name, "Lima");
    }

    #[tokio::test(start_paused = true)]
    async fn focus_with_empty_query_shows_history_then_results_take_over() {
        let (_geocoder, search, _) = controller();
        search.focus();
        assert_eq!(search.panel(), Panel::Hidden);

        search.input("Quito");
        settle().await;
        let item = search.display_list().remove(0);
        search.select(&item);

        search.focus();
        assert_eq!(search.panel(), Panel::History);
        assert!(search.display_list().iter().all(DisplayItem::is_history));

        search.input("Bogota");
        settle().await;
        assert_eq!(search.panel(), Panel::Results);
        let list = search.display_list();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_history());
        assert_eq!(list[1], DisplayItem::Result(search.results()[0].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn focus_with_blank_query_shows_history() {
        let (_geocoder, search, _) = controller();
        search.input("Quito");
        settle().await;
        let item = search.display_list().remove(0);
        search.select(&item);

        search.input("   ");
        search.focus();
        assert_eq!(search.panel(), Panel::History);
    }

    #[tokio::test(start_paused = true)]
    async fn removing_last_history_entry_hides_panel() {
        let (_geocoder, search, _) = controller();
        search.input("Accra");
        settle().await;
        let item = search.display_list().remove(0);
        search.select(&item);

        search.focus();
        let id = search.history()[0].id().to_string();
        search.remove_history(&id);
        assert_eq!(search.panel(), Panel::Hidden);
        assert!(search.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_matches_follow_query() {
        let (_geocoder, search, _) = controller();
        search.input("tok");
        let names: Vec<_> = search.catalog_matches().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Tokyo"]);
    }
}
