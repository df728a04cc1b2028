//! Core library for the `nimbus` weather CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A retrying HTTP layer with per-provider rate limiting
//! - Geocoding, plausibility validation, and forecast reconciliation
//! - Shared domain models and the storage seam
//!
//! It is used by `nimbus-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod forecast;
pub mod geocode;
pub mod http;
pub mod limiter;
pub mod model;
pub mod service;
pub mod storage;
pub mod validate;
pub mod wire;

/// Rate-limiter key and `source_provider` tag for the backing provider.
pub const PROVIDER_KEY: &str = "openweathermap";

pub use config::Config;
pub use error::FetchError;
pub use model::{Coordinates, CurrentConditions, DailyForecastEntry, FetchResult, Units};
pub use service::WeatherService;
pub use storage::{MemoryStore, WeatherStore};
