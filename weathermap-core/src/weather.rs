use crate::{
    error::WeatherFetchError,
    model::{
        Condition, CurrentConditions, DailyForecast, HourlyForecast, Location, WeatherReport,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use std::{fmt::Debug, time::Duration};

/// External forecast source for a location.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn get_weather(&self, location: &Location) -> Result<WeatherReport, WeatherFetchError>;
}

/// Simulated latency of [`SyntheticWeather`].
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1000);

const HOURLY_POINTS: i64 = 24;
const DAILY_POINTS: i64 = 2;

const CONDITIONS: [(&str, &str, &str); 4] = [
    ("Clear", "Clear sky", "01d"),
    ("Clouds", "Partly cloudy", "02d"),
    ("Rain", "Light rain", "10d"),
    ("Snow", "Light snow", "13d"),
];

/// Stand-in provider that synthesizes plausible forecasts.
///
/// Values depend only on the coordinates and the hour they describe, so
/// repeated calls within the same hour agree.
#[derive(Debug, Clone)]
pub struct SyntheticWeather {
    latency: Duration,
}

impl Default for SyntheticWeather {
    fn default() -> Self {
        Self { latency: DEFAULT_LATENCY }
    }
}

impl SyntheticWeather {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn report_at(&self, location: &Location, now: DateTime<Utc>) -> WeatherReport {
        let hour = now.duration_trunc(ChronoDuration::hours(1)).unwrap_or(now);
        let base = base_temperature(location.lat, location.lng);
        let seed = location.lat * 12.9898 + location.lng * 78.233 + hour.timestamp() as f64 / 3600.0;

        let current = CurrentConditions {
            temperature_c: round1(base + noise(seed) * 10.0 - 5.0),
            feels_like_c: round1(base + noise(seed + 1.0) * 10.0 - 3.0),
            humidity_pct: percent(30.0 + noise(seed + 2.0) * 50.0),
            wind_speed_mps: round1(2.0 + noise(seed + 3.0) * 10.0),
            visibility_km: round1(5.0 + noise(seed + 4.0) * 5.0),
            condition: condition(seed + 5.0),
        };

        let hourly = (0..HOURLY_POINTS)
            .map(|i| {
                let s = seed + i as f64 * 7.0;
                HourlyForecast {
                    time: hour + ChronoDuration::hours(i),
                    temperature_c: round1(base + noise(s) * 10.0 - 5.0 + (i as f64 * 0.5).sin() * 6.0),
                    humidity_pct: percent(30.0 + noise(s + 1.0) * 50.0),
                    wind_speed_mps: round1(2.0 + noise(s + 2.0) * 10.0),
                    precipitation_pct: percent(noise(s + 3.0) * 100.0),
                    condition: condition(s + 4.0),
                }
            })
            .collect();

        let midnight = now.duration_trunc(ChronoDuration::days(1)).unwrap_or(now);
        let daily = (0..DAILY_POINTS)
            .map(|d| {
                let s = seed + 100.0 + d as f64 * 13.0;
                let date = midnight + ChronoDuration::days(d);
                DailyForecast {
                    date,
                    day_c: round1(base + noise(s) * 8.0),
                    night_c: round1(base - 5.0 + noise(s + 1.0) * 5.0),
                    min_c: round1(base - 8.0 + noise(s + 2.0) * 3.0),
                    max_c: round1(base + 8.0 + noise(s + 3.0) * 5.0),
                    humidity_pct: percent(30.0 + noise(s + 4.0) * 50.0),
                    wind_speed_mps: round1(2.0 + noise(s + 5.0) * 10.0),
                    precipitation_pct: percent(noise(s + 6.0) * 100.0),
                    sunrise: date + ChronoDuration::hours(6),
                    sunset: date + ChronoDuration::hours(18),
                    condition: condition(s + 7.0),
                }
            })
            .collect();

        WeatherReport {
            provider: "synthetic".to_string(),
            location_name: location.label(),
            current,
            hourly,
            daily,
        }
    }
}

#[async_trait]
impl WeatherProvider for SyntheticWeather {
    async fn get_weather(&self, location: &Location) -> Result<WeatherReport, WeatherFetchError> {
        tokio::time::sleep(self.latency).await;
        Ok(self.report_at(location, Utc::now()))
    }
}

/// Warmer towards the equator-ish band, varied by longitude.
pub fn base_temperature(lat: f64, lng: f64) -> f64 {
    20.0 + (lat * 0.1).sin() * 10.0 + (lng * 0.1).cos() * 5.0
}

/// Deterministic value in `[0, 1)`.
fn noise(seed: f64) -> f64 {
    ((seed.sin() * 43_758.545_3).fract()).abs()
}

fn condition(seed: f64) -> Condition {
    let index = ((noise(seed) * CONDITIONS.len() as f64) as usize).min(CONDITIONS.len() - 1);
    let (main, description, icon) = CONDITIONS[index];
    Condition { main: main.to_string(), description: description.to_string(), icon: icon.to_string() }
}

fn percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
