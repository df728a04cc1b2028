use thiserror::Error;

/// Error taxonomy for the acquisition pipeline.
///
/// Terminal kinds (`Unauthorized`, `NotFound`, `LocationNotFound`) short-circuit
/// the orchestration immediately and are never retried. `RateLimited` and
/// `RequestFailed` surface only after the retry budget is exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider rejected the API key (HTTP 401).
    #[error("invalid API key")]
    Unauthorized,

    /// The requested resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// Geocoding returned an empty result set for the query.
    #[error("no location found for '{query}'")]
    LocationNotFound { query: String },

    /// The provider kept answering HTTP 429 until retries ran out.
    #[error("provider rate limit exhausted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Transport failure, timeout, or unexpected status after all retries.
    #[error("request failed after {attempts} attempts: {detail}")]
    RequestFailed { attempts: u32, detail: String },

    /// The payload decoded but failed plausibility checks.
    #[error("weather data failed validation: {0}")]
    ValidationFailed(String),

    /// The caller aborted the fetch mid-flight.
    #[error("fetch cancelled")]
    Cancelled,
}
