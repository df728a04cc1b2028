//! Wire-format payloads for the OpenWeatherMap endpoints.
//!
//! Each endpoint gets one explicit `Deserialize` struct, decoded exactly once
//! at the HTTP boundary. Every field the provider may omit is an `Option`, so
//! no defensive key lookups leak into business logic. Numeric fields go
//! through a lenient deserializer that also accepts string-encoded numbers
//! and rejects NaN.

use serde::{Deserialize, Deserializer};

/// Accepts a JSON number or a numeric string, yielding `None` for anything
/// else (including NaN, which a float is when it does not equal itself).
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
        Other(serde_json::Value),
    }

    let parsed = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Raw::Other(_)) | None => None,
    };

    Ok(parsed.filter(|n| n.is_finite()))
}

/// One entry from the geocoding endpoint's result array.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoEntry {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// `weather[]` element shared by the current and forecast endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherDesc {
    pub main: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentMain {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudsInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub all: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SysInfo {
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
}

/// Current-conditions endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentPayload {
    pub name: Option<String>,
    pub dt: Option<i64>,
    #[serde(default)]
    pub main: CurrentMain,
    #[serde(default)]
    pub weather: Vec<WeatherDesc>,
    #[serde(default)]
    pub wind: WindInfo,
    #[serde(default)]
    pub clouds: CloudsInfo,
    #[serde(default)]
    pub sys: SysInfo,
    #[serde(default)]
    pub coord: CoordInfo,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub visibility: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub uvi: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClimateTemp {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub day: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub night: Option<f64>,
}

/// One day from the extended/climate forecast endpoint. Note the flat field
/// names: this endpoint says `speed`/`deg`/`clouds` where the others nest
/// them under `wind` and `clouds.all`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClimateDay {
    pub dt: Option<i64>,
    #[serde(default)]
    pub temp: ClimateTemp,
    #[serde(default)]
    pub weather: Vec<WeatherDesc>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub deg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clouds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rain: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub snow: Option<f64>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

/// Climate forecast endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClimatePayload {
    #[serde(default)]
    pub list: Vec<ClimateDay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotMain {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure: Option<f64>,
}

/// One 3-hour slot from the rolling 5-day forecast endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlySlot {
    pub dt: Option<i64>,
    #[serde(default)]
    pub main: SlotMain,
    #[serde(default)]
    pub weather: Vec<WeatherDesc>,
    #[serde(default)]
    pub wind: WindInfo,
    #[serde(default)]
    pub clouds: CloudsInfo,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pop: Option<f64>,
}

/// Rolling 5-day/3-hour forecast endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyPayload {
    #[serde(default)]
    pub list: Vec<HourlySlot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "lenient_f64")]
        value: Option<f64>,
    }

    fn probe(json: &str) -> Option<f64> {
        serde_json::from_str::<Probe>(json).unwrap().value
    }

    #[test]
    fn lenient_accepts_numbers_and_numeric_strings() {
        assert_eq!(probe(r#"{"value": 12.5}"#), Some(12.5));
        assert_eq!(probe(r#"{"value": 7}"#), Some(7.0));
        assert_eq!(probe(r#"{"value": "12.5"}"#), Some(12.5));
        assert_eq!(probe(r#"{"value": " -3 "}"#), Some(-3.0));
    }

    #[test]
    fn lenient_rejects_garbage_and_nan() {
        assert_eq!(probe(r#"{"value": "not a number"}"#), None);
        assert_eq!(probe(r#"{"value": "NaN"}"#), None);
        assert_eq!(probe(r#"{"value": null}"#), None);
        assert_eq!(probe(r#"{"value": [1]}"#), None);
        assert_eq!(probe(r#"{}"#), None);
    }

    #[test]
    fn current_payload_tolerates_missing_sections() {
        let payload: CurrentPayload = serde_json::from_str(r#"{"name": "Denver"}"#).unwrap();
        assert_eq!(payload.name.as_deref(), Some("Denver"));
        assert!(payload.main.temp.is_none());
        assert!(payload.weather.is_empty());
        assert!(payload.wind.speed.is_none());
    }

    #[test]
    fn climate_day_flat_wind_fields() {
        let day: ClimateDay = serde_json::from_str(
            r#"{"dt": 1700000000, "speed": 4.2, "deg": 180, "clouds": 75}"#,
        )
        .unwrap();
        assert_eq!(day.speed, Some(4.2));
        assert_eq!(day.deg, Some(180.0));
        assert_eq!(day.clouds, Some(75.0));
    }
}
