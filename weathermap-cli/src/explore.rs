//! The interactive session: a terminal stand-in for the map page.

use crate::{
    cli::{Choice, await_weather, open_session},
    render,
};
use anyhow::Context;
use inquire::{CustomType, Select, Text};
use std::{fmt, time::Duration};
use tracing::{info, warn};
use weathermap_core::{
    Config, LifecycleState, SelectionSource, Session, catalog, map::headless::HeadlessMap,
    model::is_valid_coordinate,
};

const CONTAINER: &str = "terminal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Search,
    History,
    City,
    Click,
    Reset,
    Close,
    Quit,
}

impl Action {
    const ALL: [Action; 7] = [
        Action::Search,
        Action::History,
        Action::City,
        Action::Click,
        Action::Reset,
        Action::Close,
        Action::Quit,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Search => "Search for a place",
            Action::History => "Recent searches",
            Action::City => "Pick a catalog city",
            Action::Click => "Click the map",
            Action::Reset => "Reset view",
            Action::Close => "Close weather panel",
            Action::Quit => "Quit",
        })
    }
}

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let (session, library) = open_session(config)?;

    if let Err(err) = session.open_map(CONTAINER).await {
        // The rest of the page keeps working without a map.
        println!("The map could not be loaded: {err}");
        println!("Restart weathermap to retry.");
    }
    let click_wait = config.geocoder.timeout() + Duration::from_secs(1);

    loop {
        render::print_map_state(session.map());
        let action = Select::new("What next?", Action::ALL.to_vec()).prompt()?;

        let outcome = match action {
            Action::Search => search(&session).await,
            Action::History => history(&session).await,
            Action::City => city(&session).await,
            Action::Click => {
                let lat = CustomType::<f64>::new("Latitude:")
                    .with_error_message("Please enter a number")
                    .prompt()?;
                let lng = CustomType::<f64>::new("Longitude:")
                    .with_error_message("Please enter a number")
                    .prompt()?;
                click(&session, &library, lat, lng, click_wait).await
            }
            Action::Reset => {
                if !session.resolver().reset_view() {
                    println!("Nothing to reset right now");
                }
                Ok(())
            }
            Action::Close => {
                session.resolver().close_detail();
                Ok(())
            }
            Action::Quit => break,
        };

        if let Err(err) = outcome {
            warn!(error = %err, "action failed");
            println!("{err:#}");
        }
        if let LifecycleState::Failed(cause) = session.map().lifecycle() {
            println!("Map unavailable ({cause}). Restart weathermap to retry.");
        }
    }

    session.dispose();
    info!("explore session ended");
    Ok(())
}

async fn show_selection(session: &Session) -> anyhow::Result<()> {
    let detail = await_weather(session.resolver()).await?;
    if detail.visible {
        render::print_detail(&detail);
    }
    Ok(())
}

async fn search(session: &Session) -> anyhow::Result<()> {
    let search = session.search();
    let query = Text::new("Search:").prompt()?;
    search.input(query.trim());
    search.submit().await;

    let items = search.display_list();
    if items.is_empty() {
        println!("No places found");
        return Ok(());
    }
    let choices = items.into_iter().map(Choice).collect();
    let picked = Select::new("Pick a place:", choices).prompt()?;
    search.select(&picked.0);
    show_selection(session).await
}

async fn history(session: &Session) -> anyhow::Result<()> {
    let search = session.search();
    search.input("");
    search.focus();

    let items = search.display_list();
    if items.is_empty() {
        println!("No recent searches");
        return Ok(());
    }
    let choices = items.into_iter().map(Choice).collect();
    let picked = Select::new("Recent searches:", choices).prompt()?;
    search.select(&picked.0);
    show_selection(session).await
}

async fn city(session: &Session) -> anyhow::Result<()> {
    let filter = Text::new("Filter (empty for all):").prompt()?;
    let cities = catalog::filter(&filter);
    if cities.is_empty() {
        println!("No catalog city matches '{filter}'");
        return Ok(());
    }

    let labels: Vec<String> = cities.iter().map(render::location_line).collect();
    let picked = Select::new("City:", labels).raw_prompt()?;
    session.resolver().select(cities[picked.index].clone(), SelectionSource::Catalog);
    show_selection(session).await
}

async fn click(
    session: &Session,
    library: &HeadlessMap,
    lat: f64,
    lng: f64,
    wait: Duration,
) -> anyhow::Result<()> {
    if !is_valid_coordinate(lat, lng) {
        println!("That point is off the map");
        return Ok(());
    }
    if !session.map().is_ready() || !library.click(lat, lng) {
        println!("The map is not available");
        return Ok(());
    }

    let before = session.resolver().generation();
    tokio::time::timeout(wait, async {
        while session.resolver().generation() == before {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("The map did not answer the click")?;
    show_selection(session).await
}
