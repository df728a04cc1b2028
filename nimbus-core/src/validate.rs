//! Plausibility validation and cleaning of provider payloads.
//!
//! Current conditions are all-or-nothing: a record with one physically
//! impossible value is worse to display than no record at all. Forecast days
//! are lower stakes, so out-of-range optional fields are nulled individually
//! while impossible min/max temperatures still invalidate the day.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{Coordinates, CurrentConditions, DailyForecastEntry, Units};
use crate::wire::CurrentPayload;

/// Bound table for one unit system, fixed per validator instance.
///
/// The three temperature ranges are the same physical span (−60 °C to 60 °C)
/// re-expressed per unit system.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub min_pressure: f64,
    pub max_pressure: f64,
    pub max_wind_speed: f64,
    pub max_visibility: f64,
}

impl ValidationRules {
    pub fn for_units(units: Units) -> Self {
        let (min_temperature, max_temperature) = match units {
            Units::Imperial => (-76.0, 140.0),
            Units::Metric => (-60.0, 60.0),
            Units::Kelvin => (213.15, 333.15),
        };
        // The provider reports wind in mph for imperial and m/s otherwise.
        let max_wind_speed = match units {
            Units::Imperial => 450.0,
            Units::Metric | Units::Kelvin => 200.0,
        };

        Self {
            min_temperature,
            max_temperature,
            min_humidity: 0.0,
            max_humidity: 100.0,
            min_pressure: 800.0,
            max_pressure: 1200.0,
            max_wind_speed,
            max_visibility: 50_000.0,
        }
    }

    pub fn temperature_ok(&self, value: f64) -> bool {
        (self.min_temperature..=self.max_temperature).contains(&value)
    }

    pub fn humidity_ok(&self, value: f64) -> bool {
        (self.min_humidity..=self.max_humidity).contains(&value)
    }

    pub fn pressure_ok(&self, value: f64) -> bool {
        (self.min_pressure..=self.max_pressure).contains(&value)
    }

    pub fn wind_speed_ok(&self, value: f64) -> bool {
        (0.0..=self.max_wind_speed).contains(&value)
    }

    pub fn visibility_ok(&self, value: f64) -> bool {
        (0.0..=self.max_visibility).contains(&value)
    }
}

/// An aggregated but not yet validated forecast day, as produced by any of
/// the three tiers. `DataValidator::clean_daily` turns it into a canonical
/// entry or rejects it.
#[derive(Debug, Clone, Default)]
pub struct DailyCandidate {
    pub date: Option<NaiveDate>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_day: Option<f64>,
    pub temp_night: Option<f64>,
    pub description: Option<String>,
    pub main: Option<String>,
    pub icon: Option<String>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub cloudiness: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub uv_index: Option<f64>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub is_synthetic: bool,
}

#[derive(Debug, Clone)]
pub struct DataValidator {
    rules: ValidationRules,
}

impl DataValidator {
    pub fn new(units: Units) -> Self {
        Self { rules: ValidationRules::for_units(units) }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate and clean a current-conditions payload into a canonical
    /// record, or reject it entirely.
    ///
    /// Required: place name, temperature, and description present in the
    /// payload. Any present-but-out-of-range temperature, humidity, pressure,
    /// or wind speed rejects the whole record. Location identity comes from
    /// the resolved coordinates, so the provider's canonical display name is
    /// what lands in the record.
    pub fn clean_current(
        &self,
        payload: &CurrentPayload,
        coords: &Coordinates,
        source_provider: &str,
    ) -> Option<CurrentConditions> {
        if clean_string(payload.name.as_deref()).is_none() {
            tracing::warn!("missing required field: place name");
            return None;
        }

        let Some(temperature) = payload.main.temp else {
            tracing::warn!("missing required field: temperature");
            return None;
        };

        let weather = payload.weather.first();
        let Some(description) =
            weather.and_then(|w| clean_string(w.description.as_deref()))
        else {
            tracing::warn!("missing required field: weather description");
            return None;
        };

        if !self.rules.temperature_ok(temperature) {
            tracing::warn!(temperature, "temperature out of range, rejecting record");
            return None;
        }
        if let Some(humidity) = payload.main.humidity
            && !self.rules.humidity_ok(humidity)
        {
            tracing::warn!(humidity, "humidity out of range, rejecting record");
            return None;
        }
        if let Some(pressure) = payload.main.pressure
            && !self.rules.pressure_ok(pressure)
        {
            tracing::warn!(pressure, "pressure out of range, rejecting record");
            return None;
        }
        if let Some(wind_speed) = payload.wind.speed
            && !self.rules.wind_speed_ok(wind_speed)
        {
            tracing::warn!(wind_speed, "wind speed out of range, rejecting record");
            return None;
        }

        let captured_at = payload
            .dt
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        Some(CurrentConditions {
            place: coords.resolved_name.clone(),
            region: coords.region.clone(),
            country: clean_string(payload.sys.country.as_deref())
                .unwrap_or_else(|| coords.country.clone()),
            latitude: payload.coord.lat.unwrap_or(coords.latitude),
            longitude: payload.coord.lon.unwrap_or(coords.longitude),
            temperature,
            feels_like: payload.main.feels_like,
            humidity: payload.main.humidity.map(|h| h.round() as u8),
            pressure: payload.main.pressure,
            weather_main: weather.and_then(|w| clean_string(w.main.as_deref())),
            weather_description: description,
            weather_icon: weather.and_then(|w| clean_string(w.icon.as_deref())),
            wind_speed: payload.wind.speed,
            wind_direction: payload.wind.deg.map(normalize_degrees),
            visibility: payload
                .visibility
                .filter(|v| self.rules.visibility_ok(*v))
                .map(|v| v as u32),
            uv_index: payload.uvi,
            cloudiness: payload
                .clouds
                .all
                .filter(|c| (0.0..=100.0).contains(c))
                .map(|c| c.round() as u8),
            captured_at,
            source_provider: source_provider.to_string(),
        })
    }

    /// Validate and clean one forecast-day candidate.
    ///
    /// Out-of-range min/max temperatures (or a missing date/description)
    /// invalidate the whole day; out-of-range optional fields are nulled
    /// individually.
    pub fn clean_daily(&self, candidate: DailyCandidate) -> Option<DailyForecastEntry> {
        let date = candidate.date?;

        let (Some(temp_min), Some(temp_max)) = (candidate.temp_min, candidate.temp_max) else {
            tracing::warn!(%date, "forecast day missing temperatures, dropping");
            return None;
        };
        if !self.rules.temperature_ok(temp_min) || !self.rules.temperature_ok(temp_max) {
            tracing::warn!(%date, temp_min, temp_max, "forecast temperatures out of range, dropping day");
            return None;
        }

        let description = clean_string(candidate.description.as_deref())?;

        Some(DailyForecastEntry {
            date,
            temp_min,
            temp_max,
            temp_day: candidate.temp_day.filter(|t| self.rules.temperature_ok(*t)),
            temp_night: candidate.temp_night.filter(|t| self.rules.temperature_ok(*t)),
            description,
            main: clean_string(candidate.main.as_deref()),
            icon: clean_string(candidate.icon.as_deref()),
            humidity: candidate
                .humidity
                .filter(|h| self.rules.humidity_ok(*h))
                .map(|h| h.round() as u8),
            pressure: candidate.pressure.filter(|p| self.rules.pressure_ok(*p)),
            wind_speed: candidate.wind_speed.filter(|w| self.rules.wind_speed_ok(*w)),
            wind_direction: candidate.wind_direction.map(normalize_degrees),
            cloudiness: candidate
                .cloudiness
                .filter(|c| (0.0..=100.0).contains(c))
                .map(|c| c.round() as u8),
            precipitation_probability: candidate
                .precipitation_probability
                .filter(|p| (0.0..=1.0).contains(p)),
            uv_index: candidate.uv_index,
            sunrise: candidate.sunrise,
            sunset: candidate.sunset,
            is_synthetic: candidate.is_synthetic,
        })
    }
}

fn normalize_degrees(deg: f64) -> u16 {
    (deg.rem_euclid(360.0)) as u16
}

fn clean_string(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
