use crate::{explore, render};
use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use std::{fmt, sync::Arc, time::Duration};
use weathermap_core::{
    Config, DetailStatus, DetailView, DisplayItem, FileStore, LocationResolver, SearchHistoryStore,
    SelectionSource, Session, SyntheticWeather, catalog, geocode, map::headless::HeadlessMap,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const WEATHER_WAIT: Duration = Duration::from_secs(30);

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathermap", version, about = "Weather for places around the world")]
pub struct Cli {
    /// Print debug diagnostics to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Edit geocoder, map and history settings interactively.
    Configure,

    /// List catalog cities, optionally filtered by name or country.
    Cities {
        filter: Option<String>,
    },

    /// Search for a place by name and show its weather.
    Search {
        /// Free text, e.g. "Lyon" or "Santiago de Chile".
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Name the place at a coordinate and show its weather.
    Reverse {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },

    /// Show weather for a catalog city.
    Show {
        city: String,
    },

    /// Inspect or edit the recent search history.
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Interactive session with a map, search box and detail view.
    Explore,
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List entries, most recent first.
    List,
    /// Remove one entry by id.
    Remove { id: String },
    /// Forget all entries.
    Clear,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Cities { filter } => {
                list_cities(filter.as_deref().unwrap_or_default());
                Ok(())
            }
            Command::Search { query } => search(&query.join(" ")).await,
            Command::Reverse { lat, lng } => reverse(lat, lng).await,
            Command::Show { city } => show(&city).await,
            Command::History { action } => history(action.unwrap_or(HistoryAction::List)),
            Command::Explore => explore::run(&Config::load()?).await,
        }
    }
}

/// Builds a session over a headless map from the saved configuration.
pub fn open_session(config: &Config) -> anyhow::Result<(Session, Arc<HeadlessMap>)> {
    let geocoder = geocode::client_from_config(config)?;
    let storage = Arc::new(FileStore::new(config.history_dir()?));
    let library = Arc::new(HeadlessMap::new());
    let session = Session::new(geocoder, library.clone(), Arc::new(SyntheticWeather::default()), storage);
    Ok((session, library))
}

/// Waits until the current selection's weather settles.
pub async fn await_weather(resolver: &LocationResolver) -> anyhow::Result<DetailView> {
    let wait = async {
        loop {
            match resolver.detail() {
                Some(detail) if detail.status != DetailStatus::Loading => return Some(detail),
                Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
                None => return None,
            }
        }
    };
    tokio::time::timeout(WEATHER_WAIT, wait)
        .await
        .context("Timed out waiting for weather")?
        .ok_or_else(|| anyhow!("Nothing is selected"))
}

/// Wraps a list item so prompts can show it.
pub struct Choice(pub DisplayItem);

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.0.is_history() { "recent" } else { "found" };
        write!(f, "{:<6} {}", marker, render::search_result_line(self.0.entry()))
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    config.geocoder.base_url =
        Text::new("Geocoder base URL:").with_default(&config.geocoder.base_url).prompt()?;
    config.geocoder.user_agent =
        Text::new("Geocoder User-Agent:").with_default(&config.geocoder.user_agent).prompt()?;
    config.geocoder.timeout_secs = CustomType::<u64>::new("Geocoder timeout (seconds):")
        .with_default(config.geocoder.timeout_secs)
        .with_error_message("Please enter a whole number of seconds")
        .prompt()?;
    config.geocoder.result_limit = CustomType::<usize>::new("Results per search:")
        .with_default(config.geocoder.result_limit)
        .with_error_message("Please enter a whole number")
        .prompt()?;
    config.map.style = Text::new("Map style:").with_default(&config.map.style).prompt()?;

    let token = Text::new("Map access token (empty for none):")
        .with_default(config.map.access_token.as_deref().unwrap_or_default())
        .prompt()?;
    config.map.access_token = Some(token.trim().to_string()).filter(|t| !t.is_empty());

    config.validate()?;
    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn list_cities(filter: &str) {
    let cities = catalog::filter(filter);
    if cities.is_empty() {
        println!("No catalog city matches '{filter}'");
        return;
    }
    for city in cities {
        println!("{:>3}  {}", city.id.to_string(), render::location_line(&city));
    }
}

async fn search(query: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (session, _library) = open_session(&config)?;
    let search = session.search();

    search.input(query);
    search.submit().await;
    let items = search.display_list();
    if items.is_empty() {
        bail!("No places found for '{query}'");
    }

    let choices = items.into_iter().map(Choice).collect();
    let picked = Select::new("Pick a place:", choices).prompt()?;
    search.select(&picked.0);

    render::print_detail(&await_weather(session.resolver()).await?);
    session.dispose();
    Ok(())
}

async fn reverse(lat: f64, lng: f64) -> anyhow::Result<()> {
    if !weathermap_core::model::is_valid_coordinate(lat, lng) {
        bail!("Coordinates out of range: latitude must be within ±90, longitude within ±180");
    }
    let config = Config::load()?;
    let (session, _library) = open_session(&config)?;

    let location = session.geocoder().locate_point(lat, lng).await;
    session.resolver().select(location, SelectionSource::MapClick);

    render::print_detail(&await_weather(session.resolver()).await?);
    session.dispose();
    Ok(())
}

async fn show(city: &str) -> anyhow::Result<()> {
    let location = city
        .parse::<u32>()
        .ok()
        .and_then(catalog::get)
        .or_else(|| catalog::find_by_name(city))
        .ok_or_else(|| anyhow!("'{city}' is not a catalog city; try `weathermap search {city}`"))?;

    let config = Config::load()?;
    let (session, _library) = open_session(&config)?;
    session.resolver().select(location, SelectionSource::Catalog);

    render::print_detail(&await_weather(session.resolver()).await?);
    session.dispose();
    Ok(())
}

fn history(action: HistoryAction) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut store = SearchHistoryStore::open(Arc::new(FileStore::new(config.history_dir()?)));

    match action {
        HistoryAction::List => {
            if store.is_empty() {
                println!("No recent searches");
            }
            for (position, entry) in store.entries().iter().enumerate() {
                println!("{}. {}", position + 1, render::search_result_line(entry));
            }
        }
        HistoryAction::Remove { id } => {
            if !store.entries().iter().any(|e| e.id() == id) {
                bail!("No history entry with id '{id}'");
            }
            store.remove(&id);
            println!("Removed {id}");
        }
        HistoryAction::Clear => {
            store.clear();
            println!("History cleared");
        }
    }
    Ok(())
}
