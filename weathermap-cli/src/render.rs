//! Human-friendly output for locations and forecasts.

use chrono::{DateTime, Local, Utc};
use weathermap_core::{
    DetailStatus, DetailView, Location, MapEngine, SearchResult, WeatherReport,
    model::{Condition, WeatherIcon},
};

/// Hourly rows shown under the current conditions.
const HOURLY_ROWS: usize = 6;

fn glyph(condition: &Condition) -> &'static str {
    match condition.icon_kind() {
        WeatherIcon::Sun => "☀",
        WeatherIcon::Cloud => "☁",
        WeatherIcon::CloudRain => "☂",
    }
}

fn local(time: DateTime<Utc>) -> DateTime<Local> {
    time.with_timezone(&Local)
}

pub fn location_line(location: &Location) -> String {
    format!("{} ({:.4}, {:.4})", location.label(), location.lat, location.lng)
}

pub fn search_result_line(result: &SearchResult) -> String {
    format!("{} [{}]", result.display_name(), result.id())
}

pub fn print_detail(detail: &DetailView) {
    println!("{}", location_line(&detail.location));
    match &detail.status {
        DetailStatus::Loading => println!("  loading weather..."),
        DetailStatus::Failed(message) => println!("  {message}"),
        DetailStatus::Loaded(report) => print_report(report),
    }
}

pub fn print_report(report: &WeatherReport) {
    let now = &report.current;
    println!(
        "  {} {:.1}°C, feels like {:.1}°C, {}",
        glyph(&now.condition),
        now.temperature_c,
        now.feels_like_c,
        now.condition.description
    );
    println!(
        "  humidity {}%  wind {:.1} m/s  visibility {:.1} km",
        now.humidity_pct, now.wind_speed_mps, now.visibility_km
    );

    if !report.hourly.is_empty() {
        println!();
        println!("  Next hours");
        for hour in report.hourly.iter().take(HOURLY_ROWS) {
            println!(
                "    {}  {} {:>5.1}°C  rain {:>3}%",
                local(hour.time).format("%H:%M"),
                glyph(&hour.condition),
                hour.temperature_c,
                hour.precipitation_pct
            );
        }
    }

    if !report.daily.is_empty() {
        println!();
        println!("  Coming days");
        for day in &report.daily {
            println!(
                "    {}  {} {:>5.1}..{:<5.1}°C  sunrise {}  sunset {}",
                local(day.date).format("%a %d %b"),
                glyph(&day.condition),
                day.min_c,
                day.max_c,
                local(day.sunrise).format("%H:%M"),
                local(day.sunset).format("%H:%M")
            );
        }
    }
    println!("  ({})", report.provider);
}

pub fn print_map_state(map: &MapEngine) {
    let view = map.view();
    let moved = if map.has_moved_from_home() { "moved" } else { "home" };
    println!(
        "map: {} | center {:.2}, {:.2} | zoom {:.0} | {moved}",
        map.lifecycle(),
        view.center.lat,
        view.center.lng,
        view.zoom
    );
}
