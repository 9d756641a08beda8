//! SQLite-backed cache for location searches and forecasts.
//!
//! Reads are reactive: `observe_*` yields the current rows first and yields
//! again whenever a write touches the same table. The query orchestrator only
//! ever takes the first element.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::dto::{ForecastResponseDto, LocationDto};
use crate::error::WeatherError;
use crate::types::{Forecast, Location};

/// Reactive read handed out by the cache traits.
pub type CacheStream<T> = Pin<Box<dyn Stream<Item = Result<T, WeatherError>> + Send>>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A cached search hit, partitioned by the query that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEntity {
    pub id: Option<i64>,
    pub name: String,
    pub region: Option<String>,
    pub country: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub url: Option<String>,
    pub query: String,
}

impl LocationEntity {
    pub fn from_dto(dto: LocationDto, query: &str) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            region: dto.region,
            country: dto.country,
            lat: dto.lat,
            lon: dto.lon,
            url: dto.url,
            query: query.to_string(),
        }
    }

    pub fn to_domain(&self) -> Location {
        Location {
            id: self.id,
            name: self.name.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            lat: self.lat,
            lon: self.lon,
            url: self.url.clone(),
        }
    }
}

/// A cached forecast, stored as the raw API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntity {
    pub location_name: String,
    pub serialized_forecast: String,
    /// Milliseconds since the Unix epoch
    pub last_updated: i64,
}

impl ForecastEntity {
    pub fn from_response(
        response: &ForecastResponseDto,
        location_name: &str,
    ) -> Result<Self, WeatherError> {
        Ok(Self {
            location_name: location_name.to_string(),
            serialized_forecast: serde_json::to_string(response)?,
            last_updated: Utc::now().timestamp_millis(),
        })
    }

    /// Decodes the stored response. A corrupt record is a cache error, not a parse error.
    pub fn to_domain(&self) -> Result<Forecast, WeatherError> {
        let dto: ForecastResponseDto = serde_json::from_str(&self.serialized_forecast)
            .map_err(|source| WeatherError::CacheDecode {
                what: "forecast",
                source,
            })?;
        Ok(Forecast::from(&dto))
    }
}

/// Location search cache as seen by the location repository.
#[async_trait]
pub trait LocationCache: Send + Sync {
    /// Rows whose query starts with `query`, in insertion order.
    fn observe_by_query(&self, query: &str) -> CacheStream<Vec<LocationEntity>>;

    /// Delete every row stored under exactly `query`.
    async fn clear_by_query(&self, query: &str) -> Result<(), WeatherError>;

    async fn insert_all(&self, entities: Vec<LocationEntity>) -> Result<(), WeatherError>;

    /// Clear `query` and insert `entities`. Implementations backed by a real
    /// store should make the pair atomic to readers.
    async fn replace_query(
        &self,
        query: &str,
        entities: Vec<LocationEntity>,
    ) -> Result<(), WeatherError> {
        self.clear_by_query(query).await?;
        self.insert_all(entities).await
    }
}

/// Forecast cache as seen by the forecast repository.
#[async_trait]
pub trait ForecastCache: Send + Sync {
    /// The forecast stored under exactly `location_name`, if any.
    fn observe_forecast(&self, location_name: &str) -> CacheStream<Option<ForecastEntity>>;

    async fn upsert_forecast(&self, entity: ForecastEntity) -> Result<(), WeatherError>;
}

/// Notification broadcast after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChange {
    Locations { query: String },
    Forecast { location_name: String },
    Cleared,
}

struct CacheInner {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<CacheChange>,
}

/// SQLite cache shared by both repositories. Cheap to clone.
#[derive(Clone)]
pub struct WeatherCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for WeatherCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherCache").finish_non_exhaustive()
    }
}

impl WeatherCache {
    /// Open (or create) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WeatherError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    /// In-memory cache, used by tests and as a throwaway store.
    pub fn in_memory() -> Result<Self, WeatherError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, WeatherError> {
        init_schema(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(CacheInner {
                conn: Mutex::new(conn),
                changes,
            }),
        })
    }

    /// Drop every cached location and forecast.
    pub async fn clear_all(&self) -> Result<(), WeatherError> {
        self.run_blocking(|inner| {
            inner
                .conn
                .lock()
                .execute_batch("DELETE FROM locations; DELETE FROM forecasts;")?;
            inner.notify(CacheChange::Cleared);
            Ok(())
        })
        .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, WeatherError>
    where
        F: FnOnce(&CacheInner) -> Result<T, WeatherError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(inner.as_ref())).await?
    }

    fn observe<T, R, P>(&self, read: R, relevant: P) -> CacheStream<T>
    where
        T: Send + 'static,
        R: Fn(&CacheInner) -> Result<T, WeatherError> + Send + Sync + 'static,
        P: Fn(&CacheChange) -> bool + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let read = Arc::new(read);

        Box::pin(async_stream::stream! {
            let mut changes = inner.changes.subscribe();
            loop {
                let snapshot = {
                    let inner = Arc::clone(&inner);
                    let read = Arc::clone(&read);
                    tokio::task::spawn_blocking(move || (read.as_ref())(inner.as_ref())).await
                };
                yield match snapshot {
                    Ok(rows) => rows,
                    Err(e) => Err(WeatherError::from(e)),
                };

                loop {
                    match changes.recv().await {
                        Ok(change) if relevant(&change) => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        })
    }
}

impl CacheInner {
    fn notify(&self, change: CacheChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    fn locations_by_query(&self, query: &str) -> Result<Vec<LocationEntity>, WeatherError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r"SELECT id, name, region, country, lat, lon, url, query
              FROM locations
              WHERE query LIKE ?1 ESCAPE '\'
              ORDER BY row_id ASC",
        )?;

        let rows = stmt.query_map(params![like_prefix(query)], |row| {
            Ok(LocationEntity {
                id: row.get(0)?,
                name: row.get(1)?,
                region: row.get(2)?,
                country: row.get(3)?,
                lat: row.get(4)?,
                lon: row.get(5)?,
                url: row.get(6)?,
                query: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn clear_query(conn: &Connection, query: &str) -> rusqlite::Result<usize> {
        conn.execute("DELETE FROM locations WHERE query = ?1", params![query])
    }

    fn insert_locations(conn: &Connection, entities: &[LocationEntity]) -> rusqlite::Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO locations
            (id, name, region, country, lat, lon, url, query, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;
        for entity in entities {
            stmt.execute(params![
                entity.id,
                entity.name,
                entity.region,
                entity.country,
                entity.lat,
                entity.lon,
                entity.url,
                entity.query,
                now,
            ])?;
        }
        Ok(())
    }

    fn forecast_by_name(&self, location_name: &str) -> Result<Option<ForecastEntity>, WeatherError> {
        let conn = self.conn.lock();
        let entity = conn
            .query_row(
                "SELECT location_name, serialized_forecast, last_updated FROM forecasts WHERE location_name = ?1",
                params![location_name],
                |row| {
                    Ok(ForecastEntity {
                        location_name: row.get(0)?,
                        serialized_forecast: row.get(1)?,
                        last_updated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entity)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id INTEGER,
            name TEXT NOT NULL,
            region TEXT,
            country TEXT NOT NULL,
            lat REAL,
            lon REAL,
            url TEXT,
            query TEXT NOT NULL,
            cached_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_locations_id ON locations(id) WHERE id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_locations_query ON locations(query);

        CREATE TABLE IF NOT EXISTS forecasts (
            location_name TEXT PRIMARY KEY,
            serialized_forecast TEXT NOT NULL,
            last_updated INTEGER NOT NULL
        );
        "#,
    )
}

/// `LIKE` pattern matching every value that starts with `prefix` literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl LocationCache for WeatherCache {
    fn observe_by_query(&self, query: &str) -> CacheStream<Vec<LocationEntity>> {
        let query = query.to_string();
        self.observe(
            move |inner| inner.locations_by_query(&query),
            |change| matches!(change, CacheChange::Locations { .. } | CacheChange::Cleared),
        )
    }

    async fn clear_by_query(&self, query: &str) -> Result<(), WeatherError> {
        let query = query.to_string();
        self.run_blocking(move |inner| {
            CacheInner::clear_query(&inner.conn.lock(), &query)?;
            inner.notify(CacheChange::Locations { query });
            Ok(())
        })
        .await
    }

    async fn insert_all(&self, entities: Vec<LocationEntity>) -> Result<(), WeatherError> {
        self.run_blocking(move |inner| {
            CacheInner::insert_locations(&inner.conn.lock(), &entities)?;
            if let Some(first) = entities.first() {
                inner.notify(CacheChange::Locations {
                    query: first.query.clone(),
                });
            }
            Ok(())
        })
        .await
    }

    async fn replace_query(
        &self,
        query: &str,
        entities: Vec<LocationEntity>,
    ) -> Result<(), WeatherError> {
        let query = query.to_string();
        self.run_blocking(move |inner| {
            {
                let mut conn = inner.conn.lock();
                let tx = conn.transaction()?;
                let removed = CacheInner::clear_query(&tx, &query)?;
                CacheInner::insert_locations(&tx, &entities)?;
                tx.commit()?;
                tracing::debug!(
                    "Replaced {} cached locations for '{}' with {}",
                    removed,
                    query,
                    entities.len()
                );
            }
            inner.notify(CacheChange::Locations { query });
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ForecastCache for WeatherCache {
    fn observe_forecast(&self, location_name: &str) -> CacheStream<Option<ForecastEntity>> {
        let location_name = location_name.to_string();
        let watched = location_name.clone();
        self.observe(
            move |inner| inner.forecast_by_name(&location_name),
            move |change| match change {
                CacheChange::Forecast { location_name } => *location_name == watched,
                CacheChange::Locations { .. } => false,
                CacheChange::Cleared => true,
            },
        )
    }

    async fn upsert_forecast(&self, entity: ForecastEntity) -> Result<(), WeatherError> {
        self.run_blocking(move |inner| {
            inner.conn.lock().execute(
                r#"
                INSERT OR REPLACE INTO forecasts (location_name, serialized_forecast, last_updated)
                VALUES (?1, ?2, ?3)
                "#,
                params![
                    entity.location_name,
                    entity.serialized_forecast,
                    entity.last_updated
                ],
            )?;
            inner.notify(CacheChange::Forecast {
                location_name: entity.location_name,
            });
            Ok(())
        })
        .await
    }
}
