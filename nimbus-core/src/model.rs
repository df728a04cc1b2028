use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Unit system used for provider requests and validation bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
    Kelvin,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
            Units::Kelvin => "kelvin",
        }
    }

    /// Value of the `units` query parameter OpenWeatherMap expects.
    pub fn query_param(&self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
            Units::Kelvin => "standard",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "imperial" => Ok(Units::Imperial),
            "metric" => Ok(Units::Metric),
            "kelvin" | "standard" => Ok(Units::Kelvin),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: imperial, metric, kelvin."
            )),
        }
    }
}

/// A resolved geographic location. Produced by geocoding, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    /// The provider's canonical display name, which wins over the caller's
    /// spelling in every downstream record.
    pub resolved_name: String,
    pub region: String,
    pub country: String,
}

/// A validated, unit-normalized current-conditions observation.
///
/// Every numeric field is either a validated in-range value or `None` —
/// never a sentinel standing in for "unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub place: String,
    pub region: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub feels_like: Option<f64>,
    /// Relative humidity, 0–100 %.
    pub humidity: Option<u8>,
    /// Atmospheric pressure in hPa.
    pub pressure: Option<f64>,
    pub weather_main: Option<String>,
    pub weather_description: String,
    pub weather_icon: Option<String>,
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees, 0–359.
    pub wind_direction: Option<u16>,
    /// Visibility in meters.
    pub visibility: Option<u32>,
    pub uv_index: Option<f64>,
    /// Cloud cover, 0–100 %.
    pub cloudiness: Option<u8>,
    pub captured_at: DateTime<Utc>,
    pub source_provider: String,
}

/// One day of reconciled forecast, normalized across all three tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecastEntry {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_day: Option<f64>,
    pub temp_night: Option<f64>,
    pub description: String,
    pub main: Option<String>,
    pub icon: Option<String>,
    pub humidity: Option<u8>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<u16>,
    pub cloudiness: Option<u8>,
    /// Probability of precipitation, 0.0–1.0.
    pub precipitation_probability: Option<f64>,
    pub uv_index: Option<f64>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    /// True for placeholder days fabricated when the providers came up short.
    /// Preserved end-to-end so consumers can distinguish projected from
    /// observed data.
    pub is_synthetic: bool,
}

/// The combined outcome of one acquisition: current conditions plus a
/// best-effort daily forecast. An empty forecast is a degraded success,
/// never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub current: CurrentConditions,
    pub forecast: Vec<DailyForecastEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_roundtrip() {
        for units in [Units::Imperial, Units::Metric, Units::Kelvin] {
            let parsed = Units::try_from(units.as_str()).expect("roundtrip should succeed");
            assert_eq!(units, parsed);
        }
    }

    #[test]
    fn units_standard_alias() {
        assert_eq!(Units::try_from("standard").unwrap(), Units::Kelvin);
        assert_eq!(Units::Kelvin.query_param(), "standard");
    }

    #[test]
    fn unknown_units_error() {
        let err = Units::try_from("rankine").unwrap_err();
        assert!(err.to_string().contains("Unknown unit system"));
    }
}
