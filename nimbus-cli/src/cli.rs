use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use nimbus_core::{Config, FetchResult, MemoryStore, Units, WeatherService};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about = "Weather acquisition CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch current conditions and a seven-day forecast for a place.
    Fetch {
        /// City or place name, e.g. "denver".
        place: String,

        /// Region such as a US state code, e.g. "CO".
        region: String,

        /// Unit system: imperial, metric, or kelvin.
        #[arg(long)]
        units: Option<String>,
    },

    /// Print the path of the configuration file.
    ConfigPath,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Fetch { place, region, units } => {
                fetch(&place, &region, units.as_deref()).await
            }
            Command::ConfigPath => {
                println!("{}", Config::config_file_path()?.display());
                Ok(())
            }
        }
    }
}

async fn fetch(place: &str, region: &str, units: Option<&str>) -> anyhow::Result<()> {
    // Environment wins over the config file so one-off runs and CI can
    // inject a key without touching the user's config.
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(_) => Config::load()?,
    };
    if let Some(units) = units {
        config.units = Units::try_from(units)?;
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let service = WeatherService::new(config, Arc::new(MemoryStore::new()))?;
    let result = service.fetch_weather(place, region, &cancel).await?;
    print_result(&result);

    Ok(())
}

fn print_result(result: &FetchResult) {
    let current = &result.current;

    println!("{}, {} ({})", current.place, current.region, current.country);
    println!("  {:.1}°  {}", current.temperature, current.weather_description);
    if let Some(feels_like) = current.feels_like {
        println!("  feels like {feels_like:.1}°");
    }
    if let Some(humidity) = current.humidity {
        println!("  humidity {humidity}%");
    }
    if let Some(wind_speed) = current.wind_speed {
        match current.wind_direction {
            Some(deg) => println!("  wind {wind_speed:.1} at {deg}°"),
            None => println!("  wind {wind_speed:.1}"),
        }
    }

    if result.forecast.is_empty() {
        println!("\n  (forecast unavailable)");
        return;
    }

    println!();
    for day in &result.forecast {
        // Synthetic days are projections, marked so the reader knows.
        let marker = if day.is_synthetic { "~" } else { " " };
        println!(
            "{marker} {}  {:>6.1} / {:<6.1}  {}",
            day.date.format("%a %Y-%m-%d"),
            day.temp_min,
            day.temp_max,
            day.description
        );
    }
}
