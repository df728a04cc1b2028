//! Three-tier forecast reconciliation.
//!
//! Tiers are attempted in order, first success wins: the 8-day climate
//! forecast, then the rolling 5-day/3-hour forecast collapsed into daily
//! summaries, then synthetic placeholders padding the sequence to seven days.
//! Every produced day passes forecast-level cleaning; days that fail are
//! dropped, so seven is a best-effort target, not a hard invariant.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::PROVIDER_KEY;
use crate::config::Config;
use crate::error::FetchError;
use crate::http::RetryingClient;
use crate::limiter::RateLimiter;
use crate::model::{Coordinates, DailyForecastEntry, Units};
use crate::validate::{DailyCandidate, DataValidator};
use crate::wire::{ClimatePayload, HourlyPayload};

/// Days the reconciled forecast aims to cover, starting tomorrow.
pub const TARGET_DAYS: usize = 7;

#[derive(Debug, Clone)]
pub struct ForecastReconciler {
    client: Arc<RetryingClient>,
    limiter: Arc<RateLimiter>,
    validator: DataValidator,
    climate_url: String,
    hourly_url: String,
    api_key: String,
    units: Units,
}

impl ForecastReconciler {
    pub fn new(client: Arc<RetryingClient>, limiter: Arc<RateLimiter>, config: &Config) -> Self {
        Self {
            client,
            limiter,
            validator: DataValidator::new(config.units),
            climate_url: config.climate_forecast_url.clone(),
            hourly_url: config.hourly_forecast_url.clone(),
            api_key: config.api_key.clone(),
            units: config.units,
        }
    }

    /// Produce the daily forecast for `coords`, starting the day after
    /// `today`.
    ///
    /// Tier failures degrade silently to the next tier; only caller
    /// cancellation propagates as an error. Placeholders only ever extend
    /// data the provider actually sent: when both network tiers come back
    /// empty-handed the result is an empty sequence, not a fabricated week.
    pub async fn reconcile(
        &self,
        coords: &Coordinates,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecastEntry>, FetchError> {
        let mut provider_entries = 0;

        let mut days = match self.fetch_climate(coords, cancel).await {
            Ok(payload) => {
                provider_entries += payload.list.len();
                self.collapse_climate(payload, today)
            }
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(err) => {
                tracing::warn!(%err, "climate forecast unavailable, trying rolling tier");
                Vec::new()
            }
        };

        if days.is_empty() {
            match self.fetch_rolling(coords, cancel).await {
                Ok(payload) => {
                    provider_entries += payload.list.len();
                    days = self.collapse_rolling(payload, today);
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(err) => {
                    tracing::warn!(%err, "rolling forecast unavailable as well");
                }
            }
        }

        if days.is_empty() && provider_entries == 0 {
            tracing::warn!("no forecast data from any tier, degrading to empty forecast");
            return Ok(Vec::new());
        }

        if days.len() < TARGET_DAYS {
            tracing::debug!(real_days = days.len(), "padding forecast with placeholders");
            days = self.extend_with_placeholders(days, TARGET_DAYS, today);
        }
        days.truncate(TARGET_DAYS);

        Ok(days)
    }

    async fn fetch_climate(
        &self,
        coords: &Coordinates,
        cancel: &CancellationToken,
    ) -> Result<ClimatePayload, FetchError> {
        self.limiter.acquire(PROVIDER_KEY).await;

        // One extra day requested so seven remain after today is dropped.
        let params = [
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("appid", self.api_key.clone()),
            ("units", self.units.query_param().to_string()),
            ("cnt", "8".to_string()),
        ];
        self.client.get_json(&self.climate_url, &params, cancel).await
    }

    async fn fetch_rolling(
        &self,
        coords: &Coordinates,
        cancel: &CancellationToken,
    ) -> Result<HourlyPayload, FetchError> {
        self.limiter.acquire(PROVIDER_KEY).await;

        // 40 slots = 5 days at 3-hour granularity.
        let params = [
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("appid", self.api_key.clone()),
            ("units", self.units.query_param().to_string()),
            ("cnt", "40".to_string()),
        ];
        self.client.get_json(&self.hourly_url, &params, cancel).await
    }

    /// Flatten the climate response: drop today, clean each day, keep at
    /// most seven.
    fn collapse_climate(&self, payload: ClimatePayload, today: NaiveDate) -> Vec<DailyForecastEntry> {
        let mut days = Vec::new();

        for item in payload.list {
            let Some(date) = item.dt.and_then(local_date) else { continue };
            if date == today {
                continue;
            }

            let weather = item.weather.first().cloned().unwrap_or_default();
            let candidate = DailyCandidate {
                date: Some(date),
                temp_min: item.temp.min,
                temp_max: item.temp.max,
                temp_day: item.temp.day,
                temp_night: item.temp.night,
                description: weather.description.as_deref().map(title_case),
                main: weather.main,
                icon: weather.icon,
                humidity: item.humidity,
                pressure: item.pressure,
                wind_speed: item.speed,
                wind_direction: item.deg,
                cloudiness: item.clouds,
                // This endpoint has no pop field; precipitation amounts stand
                // in as a probability estimate.
                precipitation_probability: Some(
                    (item.rain.unwrap_or(0.0) + item.snow.unwrap_or(0.0)).clamp(0.0, 1.0),
                ),
                uv_index: None,
                sunrise: item.sunrise.and_then(utc_timestamp),
                sunset: item.sunset.and_then(utc_timestamp),
                is_synthetic: false,
            };

            if let Some(entry) = self.validator.clean_daily(candidate) {
                days.push(entry);
            }
            if days.len() == TARGET_DAYS {
                break;
            }
        }

        days
    }

    /// Group 3-hour slots by calendar date (today skipped) and collapse each
    /// date into one daily summary.
    fn collapse_rolling(&self, payload: HourlyPayload, today: NaiveDate) -> Vec<DailyForecastEntry> {
        #[derive(Default)]
        struct Bucket {
            temps: Vec<f64>,
            conditions: Vec<String>,
            icons: Vec<String>,
            humidity: Vec<f64>,
            pressure: Vec<f64>,
            wind_speed: Vec<f64>,
            clouds: Vec<f64>,
            max_pop: Option<f64>,
        }

        let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();

        for slot in payload.list {
            let Some(date) = slot.dt.and_then(local_date) else { continue };
            if date == today {
                continue;
            }

            let bucket = buckets.entry(date).or_default();
            if let Some(temp) = slot.main.temp {
                bucket.temps.push(temp);
            }
            if let Some(weather) = slot.weather.first() {
                if let Some(description) = &weather.description {
                    bucket.conditions.push(description.clone());
                }
                if let Some(icon) = &weather.icon {
                    bucket.icons.push(icon.clone());
                }
            }
            if let Some(humidity) = slot.main.humidity {
                bucket.humidity.push(humidity);
            }
            if let Some(pressure) = slot.main.pressure {
                bucket.pressure.push(pressure);
            }
            if let Some(speed) = slot.wind.speed {
                bucket.wind_speed.push(speed);
            }
            if let Some(clouds) = slot.clouds.all {
                bucket.clouds.push(clouds);
            }
            if let Some(pop) = slot.pop {
                bucket.max_pop = Some(bucket.max_pop.map_or(pop, |m: f64| m.max(pop)));
            }
        }

        let mut days = Vec::new();
        for (date, bucket) in buckets {
            if bucket.temps.is_empty() {
                continue;
            }

            let temp_min = bucket.temps.iter().copied().fold(f64::INFINITY, f64::min);
            let temp_max = bucket.temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let condition = most_frequent(&bucket.conditions);

            let candidate = DailyCandidate {
                date: Some(date),
                temp_min: Some(temp_min),
                temp_max: Some(temp_max),
                temp_day: mean(&bucket.temps),
                // Best approximation available from 3-hour slots.
                temp_night: Some(temp_min),
                description: condition.map(|c| title_case(c)),
                main: condition
                    .and_then(|c| c.split_whitespace().next())
                    .map(title_case),
                icon: most_frequent(&bucket.icons).map(str::to_string),
                humidity: mean(&bucket.humidity),
                pressure: mean(&bucket.pressure),
                wind_speed: mean(&bucket.wind_speed),
                // Direction does not average meaningfully across a day.
                wind_direction: None,
                cloudiness: mean(&bucket.clouds),
                precipitation_probability: bucket.max_pop,
                uv_index: None,
                sunrise: None,
                sunset: None,
                is_synthetic: false,
            };

            if let Some(entry) = self.validator.clean_daily(candidate) {
                days.push(entry);
            }
        }

        days
    }

    /// Pad `days` to `target` entries with synthetic placeholders, every one
    /// flagged `is_synthetic`.
    fn extend_with_placeholders(
        &self,
        mut days: Vec<DailyForecastEntry>,
        target: usize,
        today: NaiveDate,
    ) -> Vec<DailyForecastEntry> {
        if days.len() >= target {
            days.truncate(target);
            return days;
        }

        let needed = target - days.len();
        let real_count = days.len();

        if let Some(last) = days.last().cloned() {
            let avg_min = mean(&days.iter().map(|d| d.temp_min).collect::<Vec<_>>())
                .unwrap_or(last.temp_min);
            let avg_max = mean(&days.iter().map(|d| d.temp_max).collect::<Vec<_>>())
                .unwrap_or(last.temp_max);
            let avg_humidity =
                mean(&days.iter().filter_map(|d| d.humidity.map(f64::from)).collect::<Vec<_>>())
                    .unwrap_or(50.0);
            let avg_pressure =
                mean(&days.iter().filter_map(|d| d.pressure).collect::<Vec<_>>()).unwrap_or(1013.0);

            let mains: Vec<String> = days.iter().filter_map(|d| d.main.clone()).collect();
            let main = most_frequent(&mains).unwrap_or("Clear").to_string();
            let icons: Vec<String> = days.iter().filter_map(|d| d.icon.clone()).collect();
            let icon = most_frequent(&icons).unwrap_or("01d").to_string();

            for i in 0..needed {
                // Small monotonic drift so padded days are not a flat repeat;
                // flattens out after day four.
                let drift = if i < 4 { -2.0 + 0.5 * i as f64 } else { 0.0 };
                let date = today + Duration::days((real_count + i + 1) as i64);

                let candidate = DailyCandidate {
                    date: Some(date),
                    temp_min: Some(avg_min + drift),
                    temp_max: Some(avg_max + drift),
                    temp_day: Some((avg_min + avg_max) / 2.0 + drift),
                    temp_night: Some(avg_min + drift),
                    description: Some(format!("Predicted {main}")),
                    main: Some(main.clone()),
                    icon: Some(icon.clone()),
                    humidity: Some(avg_humidity),
                    pressure: Some(avg_pressure),
                    wind_speed: last.wind_speed.or(Some(5.0)),
                    wind_direction: last.wind_direction.map(f64::from).or(Some(0.0)),
                    cloudiness: last.cloudiness.map(f64::from).or(Some(20.0)),
                    precipitation_probability: Some(0.1),
                    uv_index: None,
                    sunrise: None,
                    sunset: None,
                    is_synthetic: true,
                };

                if let Some(entry) = self.validator.clean_daily(candidate) {
                    days.push(entry);
                }
            }
        } else {
            // No real data at all: generic defaults in the active unit system.
            let (temp_min, temp_max, temp_day, temp_night) = match self.units {
                Units::Imperial => (70.0, 80.0, 75.0, 65.0),
                Units::Metric => (21.0, 27.0, 24.0, 18.0),
                Units::Kelvin => (294.0, 300.0, 297.0, 291.0),
            };

            for i in 0..needed {
                let candidate = DailyCandidate {
                    date: Some(today + Duration::days((i + 1) as i64)),
                    temp_min: Some(temp_min),
                    temp_max: Some(temp_max),
                    temp_day: Some(temp_day),
                    temp_night: Some(temp_night),
                    description: Some("Forecast Unavailable".to_string()),
                    main: Some("Unknown".to_string()),
                    icon: Some("01d".to_string()),
                    humidity: Some(50.0),
                    pressure: Some(1013.0),
                    wind_speed: Some(5.0),
                    wind_direction: Some(0.0),
                    cloudiness: Some(20.0),
                    precipitation_probability: Some(0.0),
                    uv_index: None,
                    sunrise: None,
                    sunset: None,
                    is_synthetic: true,
                };

                if let Some(entry) = self.validator.clean_daily(candidate) {
                    days.push(entry);
                }
            }
        }

        days
    }
}

/// Calendar date of a unix timestamp in the machine's local zone, matching
/// how "today" is computed for the exclusion rule.
fn local_date(ts: i64) -> Option<NaiveDate> {
    Local.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive())
}

fn utc_timestamp(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() { None } else { Some(values.iter().sum::<f64>() / values.len() as f64) }
}

/// Most frequent item; ties break toward the first-seen item so the result
/// is deterministic for a given provider row order.
fn most_frequent(items: &[String]) -> Option<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.as_str()).or_insert(0) += 1;
    }
    let best = counts.values().copied().max()?;
    items.iter().map(String::as_str).find(|item| counts[item] == best)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
