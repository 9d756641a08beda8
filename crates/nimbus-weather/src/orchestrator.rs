//! Cache-first query flow shared by the repositories.
//!
//! Every stream emits `Loading { data: <cached snapshot> }` and then exactly one
//! terminal `Success` or `Failure`. The remote refresh runs on the owning
//! repository's [`TaskTracker`], not on the stream, so dropping the stream after
//! `Loading` does not cancel the fetch or the cache write that follows it.

use std::future::Future;
use std::pin::Pin;

use nimbus_core::{ErrorKind, ResultState};
use tokio::sync::oneshot;
use tokio_stream::{Stream, StreamExt};
use tokio_util::task::TaskTracker;

use crate::cache::CacheStream;
use crate::error::WeatherError;

pub type ResultStream<T> = Pin<Box<dyn Stream<Item = ResultState<T>> + Send>>;

const LOST_REFRESH_MESSAGE: &str = "Background refresh ended without a result";

/// Why a background refresh did not produce fresh data.
#[derive(Debug)]
pub enum RefreshError {
    /// The remote source failed; a cached value, if any, is still good to show.
    Remote(WeatherError),
    /// The fetch succeeded but the cache write did not.
    Persist(WeatherError),
}

/// Builds a cache-first stream for `key`.
///
/// `cached` resolves to the current snapshot (already filtered for
/// emptiness and decode failures). `refresh` fetches, persists and returns
/// the fresh value; it is started on `tracker` as soon as the snapshot is
/// known, before `Loading` is yielded.
pub(crate) fn cache_first<T, C, F, Fut>(
    tracker: &TaskTracker,
    key: String,
    cached: C,
    refresh: F,
) -> ResultStream<T>
where
    T: Clone + Send + 'static,
    C: Future<Output = Option<T>> + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, RefreshError>> + Send + 'static,
{
    let tracker = tracker.clone();

    Box::pin(async_stream::stream! {
        let cached = cached.await;
        tracing::debug!("'{}': cached snapshot present: {}", key, cached.is_some());

        // Must start before `Loading` is yielded; consumers may stop after it.
        let (tx, rx) = oneshot::channel();
        let task_key = key.clone();
        let fallback = cached.clone();
        tracker.spawn(async move {
            let outcome = settle(&task_key, refresh().await, fallback);
            // The consumer may be gone; the cache write already happened.
            let _ = tx.send(outcome);
        });

        yield ResultState::loading(cached);

        match rx.await {
            Ok(outcome) => {
                yield outcome;
            }
            Err(_) => {
                tracing::error!("'{}': refresh task ended without a result", key);
                yield ResultState::failure(ErrorKind::unknown(Some(LOST_REFRESH_MESSAGE), None));
            }
        }
    })
}

/// Picks the terminal envelope for a finished refresh.
fn settle<T>(key: &str, outcome: Result<T, RefreshError>, cached: Option<T>) -> ResultState<T> {
    match outcome {
        Ok(fresh) => ResultState::success(fresh),
        Err(RefreshError::Remote(e)) => {
            let kind = e.classify();
            match cached {
                Some(cached) => {
                    tracing::warn!("'{}': refresh failed, serving cached data: {}", key, e);
                    ResultState::success(cached)
                }
                None => {
                    tracing::warn!("'{}': refresh failed with nothing cached: {}", key, e);
                    ResultState::failure(kind)
                }
            }
        }
        Err(RefreshError::Persist(e)) => {
            tracing::error!("'{}': failed to cache fresh data: {}", key, e);
            ResultState::failure(e.classify())
        }
    }
}

/// First element of a reactive cache read. A read error counts as "nothing cached".
pub(crate) async fn first_snapshot<T>(mut stream: CacheStream<T>, key: &str) -> Option<T> {
    match stream.next().await {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            tracing::warn!("'{}': cache read failed, treating as empty: {}", key, e);
            None
        }
        None => None,
    }
}
