//! Free-text place resolution via the provider's geocoding endpoint.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::FetchError;
use crate::http::RetryingClient;
use crate::model::Coordinates;
use crate::wire::GeoEntry;

/// Resolves "place, region" to coordinates plus the provider's canonical
/// display name.
#[derive(Debug, Clone)]
pub struct GeocodingResolver {
    client: Arc<RetryingClient>,
    geocoding_url: String,
    api_key: String,
    default_country: String,
}

impl GeocodingResolver {
    pub fn new(client: Arc<RetryingClient>, config: &Config) -> Self {
        Self {
            client,
            geocoding_url: config.geocoding_url.clone(),
            api_key: config.api_key.clone(),
            default_country: config.default_country.clone(),
        }
    }

    /// Look up `place, region` with the configured country, requesting exactly
    /// one result. An empty result set is `LocationNotFound`.
    ///
    /// The returned name is the provider's echo, not the caller's input, so a
    /// query for "denver" resolves to "Denver" everywhere downstream.
    pub async fn resolve(
        &self,
        place: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Coordinates, FetchError> {
        let query = format!("{place},{region},{}", self.default_country);
        let params = [
            ("q", query.clone()),
            ("limit", "1".to_string()),
            ("appid", self.api_key.clone()),
        ];

        let entries: Vec<GeoEntry> =
            self.client.get_json(&self.geocoding_url, &params, cancel).await?;

        let Some(entry) = entries.into_iter().next() else {
            tracing::warn!(query, "geocoding returned no results");
            return Err(FetchError::LocationNotFound { query });
        };

        tracing::debug!(
            name = entry.name,
            lat = entry.lat,
            lon = entry.lon,
            "resolved location"
        );

        Ok(Coordinates {
            latitude: entry.lat,
            longitude: entry.lon,
            resolved_name: entry.name,
            region: entry.state.unwrap_or_else(|| region.to_string()),
            country: entry.country.unwrap_or_else(|| self.default_country.clone()),
        })
    }
}
