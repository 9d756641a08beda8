//! Repositories wiring the remote source and the cache store together.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::cache::{ForecastCache, ForecastEntity, LocationCache, LocationEntity};
use crate::orchestrator::{cache_first, first_snapshot, RefreshError, ResultStream};
use crate::provider::WeatherApi;
use crate::types::{Forecast, Location};

/// Cache-first location search.
pub struct LocationRepository {
    api: Arc<dyn WeatherApi>,
    cache: Arc<dyn LocationCache>,
    refreshes: Refreshes,
}

impl LocationRepository {
    pub fn new(api: Arc<dyn WeatherApi>, cache: Arc<dyn LocationCache>) -> Self {
        Self {
            api,
            cache,
            refreshes: Refreshes::default(),
        }
    }

    /// Emits cached matches for `query` (rows whose stored query starts with
    /// it) as `Loading`, then the fresh API result or the best fallback.
    pub fn search_locations(&self, query: &str) -> ResultStream<Vec<Location>> {
        let query = query.to_string();
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);

        let snapshot = {
            let stream = self.cache.observe_by_query(&query);
            let key = query.clone();
            async move {
                first_snapshot(stream, &key)
                    .await
                    .filter(|rows| !rows.is_empty())
                    .map(|rows| rows.iter().map(LocationEntity::to_domain).collect::<Vec<_>>())
            }
        };

        let refresh_query = query.clone();
        cache_first(&self.refreshes.tracker, query, snapshot, move || async move {
            let query = refresh_query;
            let results = api
                .search_locations(&query)
                .await
                .map_err(RefreshError::Remote)?;
            tracing::info!("Search '{}' returned {} locations", query, results.len());

            let locations: Vec<Location> = results.iter().cloned().map(Location::from).collect();
            let entities = results
                .into_iter()
                .map(|dto| LocationEntity::from_dto(dto, &query))
                .collect();
            cache
                .replace_query(&query, entities)
                .await
                .map_err(RefreshError::Persist)?;

            Ok::<_, RefreshError>(locations)
        })
    }

    /// Waits until every refresh started so far has finished, including its cache write.
    pub async fn wait_idle(&self) {
        self.refreshes.wait_idle().await;
    }
}

/// Cache-first forecast lookup.
pub struct ForecastRepository {
    api: Arc<dyn WeatherApi>,
    cache: Arc<dyn ForecastCache>,
    refreshes: Refreshes,
}

impl ForecastRepository {
    pub fn new(api: Arc<dyn WeatherApi>, cache: Arc<dyn ForecastCache>) -> Self {
        Self {
            api,
            cache,
            refreshes: Refreshes::default(),
        }
    }

    /// Forecasts are cached under the trimmed location name.
    pub fn get_forecast(&self, location_name: &str, days: u8) -> ResultStream<Forecast> {
        let key = location_name.trim().to_string();
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);

        let snapshot = {
            let stream = self.cache.observe_forecast(&key);
            let key = key.clone();
            async move {
                let Some(entity) = first_snapshot(stream, &key).await.flatten() else {
                    return None;
                };
                match entity.to_domain() {
                    Ok(forecast) => Some(forecast),
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable cached forecast for '{}': {}", key, e);
                        None
                    }
                }
            }
        };

        let refresh_key = key.clone();
        cache_first(&self.refreshes.tracker, key, snapshot, move || async move {
            let key = refresh_key;
            let response = api
                .get_forecast(&key, days)
                .await
                .map_err(RefreshError::Remote)?;
            let forecast = Forecast::from(&response);
            tracing::info!(
                "Fetched {}-day forecast for '{}'",
                forecast.days.len(),
                key
            );

            let entity =
                ForecastEntity::from_response(&response, &key).map_err(RefreshError::Persist)?;
            cache
                .upsert_forecast(entity)
                .await
                .map_err(RefreshError::Persist)?;

            Ok::<_, RefreshError>(forecast)
        })
    }

    pub async fn wait_idle(&self) {
        self.refreshes.wait_idle().await;
    }
}

/// Background refreshes owned by one repository.
#[derive(Default)]
struct Refreshes {
    tracker: TaskTracker,
    // Held across close/wait/reopen so one caller cannot reopen the tracker
    // while another is still waiting on it.
    idle: Mutex<()>,
}

impl Refreshes {
    async fn wait_idle(&self) {
        let _guard = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
