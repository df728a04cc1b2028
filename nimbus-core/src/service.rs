//! One-call orchestration of a full weather acquisition.

use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::PROVIDER_KEY;
use crate::config::Config;
use crate::error::FetchError;
use crate::forecast::ForecastReconciler;
use crate::geocode::GeocodingResolver;
use crate::http::RetryingClient;
use crate::limiter::RateLimiter;
use crate::model::FetchResult;
use crate::storage::WeatherStore;
use crate::validate::DataValidator;
use crate::wire::CurrentPayload;

/// Ties the acquisition pipeline together: cache lookup, geocoding, current
/// conditions, forecast reconciliation, persistence.
pub struct WeatherService {
    config: Config,
    client: Arc<RetryingClient>,
    limiter: Arc<RateLimiter>,
    resolver: GeocodingResolver,
    validator: DataValidator,
    reconciler: ForecastReconciler,
    store: Arc<dyn WeatherStore>,
}

impl WeatherService {
    pub fn new(config: Config, store: Arc<dyn WeatherStore>) -> anyhow::Result<Self> {
        config.validate()?;

        let client = Arc::new(RetryingClient::new(&config)?);
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval()));
        let resolver = GeocodingResolver::new(Arc::clone(&client), &config);
        let validator = DataValidator::new(config.units);
        let reconciler =
            ForecastReconciler::new(Arc::clone(&client), Arc::clone(&limiter), &config);

        Ok(Self { config, client, limiter, resolver, validator, reconciler, store })
    }

    /// Fetch current conditions and a seven-day forecast for `place, region`.
    ///
    /// A stored result younger than the configured max age is returned
    /// without touching the network. Otherwise the place is geocoded, current
    /// conditions are fetched and cleaned, and the forecast is reconciled.
    /// Forecast trouble degrades to fewer (or zero) days; current-conditions
    /// trouble fails the call.
    pub async fn fetch_weather(
        &self,
        place: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        if let Some(cached) =
            self.store.get_cached(place, region, self.config.cache_max_age()).await
        {
            tracing::info!(place, region, "serving stored result");
            return Ok(cached);
        }

        self.limiter.acquire(PROVIDER_KEY).await;
        let coords = self.resolver.resolve(place, region, cancel).await?;

        self.limiter.acquire(PROVIDER_KEY).await;
        let params = [
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("appid", self.config.api_key.clone()),
            ("units", self.config.units.query_param().to_string()),
        ];
        let payload: CurrentPayload = self
            .client
            .get_json(&self.config.current_weather_url, &params, cancel)
            .await?;

        let Some(current) = self.validator.clean_current(&payload, &coords, PROVIDER_KEY) else {
            return Err(FetchError::ValidationFailed(
                "current conditions failed plausibility checks".to_string(),
            ));
        };

        let today = Local::now().date_naive();
        let forecast = match self.reconciler.reconcile(&coords, today, cancel).await {
            Ok(days) => days,
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(err) => {
                tracing::warn!(%err, "forecast unavailable, returning current conditions only");
                Vec::new()
            }
        };

        let result = FetchResult { current, forecast };

        if let Err(err) = self.store.save_validated(place, region, &result).await {
            tracing::warn!(%err, "failed to persist result, continuing");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Units;
    use crate::storage::MemoryStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAY_SECS: i64 = 24 * 60 * 60;

    fn test_config(server: &MockServer) -> Config {
        Config {
            geocoding_url: format!("{}/geo", server.uri()),
            current_weather_url: format!("{}/weather", server.uri()),
            climate_forecast_url: format!("{}/climate", server.uri()),
            hourly_forecast_url: format!("{}/forecast", server.uri()),
            retry_delays_secs: vec![0.01],
            min_request_interval_secs: 0.0,
            ..Config::with_api_key("KEY")
        }
    }

    async fn mount_geocoding(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/geo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": 39.74, "lon": -104.99, "name": "Denver", "state": "CO", "country": "US"}
            ])))
            .mount(server)
            .await;
    }

    fn current_body(temp: f64) -> serde_json::Value {
        serde_json::json!({
            "name": "Denver",
            "dt": chrono::Utc::now().timestamp(),
            "main": {"temp": temp, "humidity": 40, "pressure": 1013},
            "weather": [{"main": "Clear", "description": "clear sky", "icon": "01d"}],
            "wind": {"speed": 5.0, "deg": 270},
            "clouds": {"all": 10},
            "sys": {"country": "US"},
            "coord": {"lat": 39.74, "lon": -104.99},
            "visibility": 10000
        })
    }

    fn climate_body() -> serde_json::Value {
        let base = Local::now().timestamp();
        let list: Vec<_> = (0..8)
            .map(|i| {
                serde_json::json!({
                    "dt": base + i * DAY_SECS,
                    "temp": {"min": 55.0, "max": 78.0, "day": 70.0, "night": 57.0},
                    "weather": [{"main": "Clear", "description": "clear sky", "icon": "01d"}],
                    "humidity": 35, "pressure": 1012, "speed": 6.0, "deg": 200, "clouds": 5
                })
            })
            .collect();
        serde_json::json!({ "list": list })
    }

    #[tokio::test]
    async fn full_acquisition_returns_current_and_seven_days() {
        let server = MockServer::start().await;
        mount_geocoding(&server).await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("appid", "KEY"))
            .and(query_param("units", "imperial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(72.5)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/climate"))
            .and(query_param("cnt", "8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(climate_body()))
            .expect(1)
            .mount(&server)
            .await;

        let service =
            WeatherService::new(test_config(&server), Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();
        let result = service.fetch_weather("denver", "CO", &cancel).await.unwrap();

        assert_eq!(result.current.place, "Denver");
        assert_eq!(result.current.temperature, 72.5);
        assert_eq!(result.current.source_provider, "openweathermap");
        assert_eq!(result.forecast.len(), 7);
        assert!(!result.forecast[0].is_synthetic);
    }

    #[tokio::test]
    async fn second_call_is_served_from_the_store() {
        let server = MockServer::start().await;
        mount_geocoding(&server).await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(72.5)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/climate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(climate_body()))
            .expect(1)
            .mount(&server)
            .await;

        let service =
            WeatherService::new(test_config(&server), Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();

        let first = service.fetch_weather("denver", "CO", &cancel).await.unwrap();
        let second = service.fetch_weather("denver", "CO", &cancel).await.unwrap();

        // Mock expectations of one call each prove the second hit no endpoint.
        assert_eq!(first.current.temperature, second.current.temperature);
    }

    #[tokio::test]
    async fn implausible_current_conditions_fail_the_call() {
        let server = MockServer::start().await;
        mount_geocoding(&server).await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(5000.0)))
            .mount(&server)
            .await;

        let service =
            WeatherService::new(test_config(&server), Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();
        let err = service.fetch_weather("denver", "CO", &cancel).await.unwrap_err();

        assert!(matches!(err, FetchError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn forecast_outage_still_yields_a_result() {
        let server = MockServer::start().await;
        mount_geocoding(&server).await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(72.5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/climate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service =
            WeatherService::new(test_config(&server), Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();
        let result = service.fetch_weather("denver", "CO", &cancel).await.unwrap();

        // Both forecast tiers down: degraded success with an empty forecast.
        assert_eq!(result.current.temperature, 72.5);
        assert!(result.forecast.is_empty());
    }

    #[tokio::test]
    async fn unknown_place_is_location_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let service =
            WeatherService::new(test_config(&server), Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();
        let err = service.fetch_weather("atlantis", "ZZ", &cancel).await.unwrap_err();

        assert!(matches!(err, FetchError::LocationNotFound { .. }));
    }

    #[tokio::test]
    async fn metric_units_flow_through_to_requests() {
        let server = MockServer::start().await;
        mount_geocoding(&server).await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(22.5)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/climate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = Config { units: Units::Metric, ..test_config(&server) };
        let service = WeatherService::new(config, Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();
        let result = service.fetch_weather("denver", "CO", &cancel).await.unwrap();

        assert_eq!(result.current.temperature, 22.5);
    }
}
