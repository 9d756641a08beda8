use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nimbus_core::Config;
use nimbus_weather::{
    Forecast, ForecastRepository, GetForecastUseCase, Location, LocationRepository, ResultStream,
    SearchLocationsUseCase, WeatherApiClient, WeatherCache,
};
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Cache-first weather lookups")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search locations by name
    Search {
        /// Location name or prefix
        query: String,
    },
    /// Show the forecast for a location
    Forecast {
        /// Location name as returned by search
        location: String,
        /// Number of days (defaults to forecast.days from the config)
        days: Option<u8>,
    },
    /// Drop every cached location and forecast
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize core
    nimbus_core::init()?;

    // Warnings are logged by the loader; errors abort.
    let (config, _validation) = Config::load_validated()?;

    let cache = WeatherCache::open(&config.cache.path)
        .with_context(|| format!("Failed to open cache at {}", config.cache.path.display()))?;
    let api = Arc::new(WeatherApiClient::from_config(&config.api)?);

    tracing::info!("Nimbus started");

    let failed = match cli.command {
        Commands::Search { query } => {
            let repo = Arc::new(LocationRepository::new(api, Arc::new(cache)));
            let use_case = SearchLocationsUseCase::with_min_query_length(
                Arc::clone(&repo),
                config.search.min_query_length,
            );
            let failed = print_states(use_case.execute(&query), print_locations).await;
            repo.wait_idle().await;
            failed
        }
        Commands::Forecast { location, days } => {
            let repo = Arc::new(ForecastRepository::new(api, Arc::new(cache)));
            let use_case = GetForecastUseCase::new(Arc::clone(&repo));
            let days = days.unwrap_or(config.forecast.days);
            let failed = print_states(use_case.execute(&location, days), print_forecast).await;
            repo.wait_idle().await;
            failed
        }
        Commands::ClearCache => {
            cache.clear_all().await?;
            println!("Cache cleared: {}", config.cache.path.display());
            false
        }
    };

    if failed {
        bail!("Query failed");
    }
    Ok(())
}

/// Prints each envelope as it arrives. Returns true when the query ended in failure.
async fn print_states<T: 'static>(mut states: ResultStream<T>, print: fn(&T)) -> bool {
    while let Some(state) = states.next().await {
        if let Some(error) = state.error() {
            tracing::debug!("Query failed: {:?}", error);
            eprintln!("Error: {}", error.user_message());
        } else {
            match (state.is_loading(), state.data()) {
                (true, None) => println!("Loading..."),
                (true, Some(data)) => {
                    println!("Loading (cached):");
                    print(data);
                }
                (false, data) => {
                    println!("Done:");
                    if let Some(data) = data {
                        print(data);
                    }
                }
            }
        }

        if state.is_terminal() {
            return state.is_failure();
        }
    }
    false
}

#[allow(clippy::ptr_arg)]
fn print_locations(locations: &Vec<Location>) {
    if locations.is_empty() {
        println!("  (no locations)");
    }
    for location in locations {
        println!("  {}", location.display_name());
    }
}

fn print_forecast(forecast: &Forecast) {
    println!("  {}", forecast.location_name);
    for day in &forecast.days {
        println!("  {}  {:>5.1}°C  {}", day.date, day.avg_temp_c, day.condition_text);
    }
}
