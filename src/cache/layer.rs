//! Cacheable data: one value, one cache key, one fetcher, five ways to get it.
//!
//! | strategy             | Success                   | Error                          | Empty                               | source       |
//! |----------------------|---------------------------|--------------------------------|-------------------------------------|--------------|
//! | `get_new`            | fetch ok                  | fetch failed                   | never                               | NEW          |
//! | `get_cached`         | cache hit                 | cache read failed              | cache miss                          | CACHE        |
//! | `get_cached_or_new`  | from cache, else from new | from new                       | never                               | CACHE or NEW |
//! | `get_new_or_cached`  | from new, else from cache | from cache                     | fetch failed and cache missed       | NEW or CACHE |
//! | `get_cached_and_new` | both                      | cache (unless filtered) and new | cache (unless filtered)            | CACHE, NEW   |

use color_eyre::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;

use super::storage::CacheableDataCache;
use super::traits::{Cacheable, CacheableDataSource, CacheableResultWrapper, CacheableUniqueCacheKey};
use crate::error::SharedError;
use crate::logging::Logger;

const LOG_TAG: &str = "CacheableData";

/// A factory function that creates futures for fetching fresh data
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Cache-or-fetch wrapper around a single value.
///
/// Every operation returns a [`CacheableResultWrapper`]; failures of the
/// fetcher or of cache reads are captured in the result, never returned as
/// `Err`.
pub struct CacheableData<C, T> {
  cache: Arc<C>,
  key: CacheableUniqueCacheKey,
  fetcher: FetcherFn<T>,
  logger: Logger,
}

impl<C, T> CacheableData<C, T>
where
  C: CacheableDataCache + 'static,
  T: Cacheable + std::fmt::Debug,
{
  /// Create a new cacheable value backed by `cache`.
  ///
  /// The fetcher is a closure that returns a future. It will be called each
  /// time fresh data is needed.
  ///
  /// # Example
  ///
  /// ```ignore
  /// let profile = CacheableData::new(cache, CacheableUniqueCacheKey::new("Profile"), move || {
  ///     let api = api.clone();
  ///     async move { api.profile().await }
  /// });
  /// ```
  pub fn new<F, Fut>(cache: Arc<C>, key: CacheableUniqueCacheKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    Self {
      cache,
      key,
      fetcher: Box::new(move || Box::pin(fetcher())),
      logger: Logger::default(),
    }
  }

  /// Replace the logger.
  pub fn with_logger(mut self, logger: Logger) -> Self {
    self.logger = logger;
    self
  }

  pub fn key(&self) -> &CacheableUniqueCacheKey {
    &self.key
  }

  /// Fetch fresh data, optionally storing it.
  ///
  /// Storing is best-effort: when the write fails the fetched data is still
  /// returned as a success and the failure is only logged.
  pub async fn get_new(&self, cache_new_value: bool) -> CacheableResultWrapper<T> {
    self.logger.debug(LOG_TAG, || {
      format!(
        "Getting #get_new for {} with key {} and cache_new_value {}",
        T::cache_type(),
        self.key,
        cache_new_value
      )
    });

    let data = match (self.fetcher)().await {
      Ok(data) => data,
      Err(e) => {
        let error = SharedError::from(e);
        self.logger.debug(LOG_TAG, || {
          format!(
            "Returning #get_new error for {} with key {}: {}",
            T::cache_type(),
            self.key,
            error
          )
        });
        return CacheableResultWrapper::Error {
          error,
          source: CacheableDataSource::New,
          key: self.key.clone(),
        };
      }
    };

    if cache_new_value {
      match self.cache.set_value(&self.key, &data).await {
        Ok(()) => self.logger.debug(LOG_TAG, || {
          format!(
            "Stored #get_new result for {} with key {}: {:?}",
            T::cache_type(),
            self.key,
            data
          )
        }),
        Err(e) => {
          let error = SharedError::from(e);
          self.logger.warn(
            LOG_TAG,
            || {
              format!(
                "Failed to store #get_new result for {} with key {}",
                T::cache_type(),
                self.key
              )
            },
            Some(&error),
          );
        }
      }
    }

    let result = CacheableResultWrapper::Success {
      data,
      source: CacheableDataSource::New,
      key: self.key.clone(),
    };
    self
      .logger
      .debug(LOG_TAG, || format!("Returning #get_new {}", result));
    result
  }

  /// Read the cached value.
  pub async fn get_cached(&self) -> CacheableResultWrapper<T> {
    self.logger.debug(LOG_TAG, || {
      format!(
        "Getting #get_cached for {} with key {}",
        T::cache_type(),
        self.key
      )
    });

    let result = match self.cache.get_value::<T>(&self.key).await {
      Ok(Some(data)) => CacheableResultWrapper::Success {
        data,
        source: CacheableDataSource::Cache,
        key: self.key.clone(),
      },
      Ok(None) => CacheableResultWrapper::Empty {
        source: CacheableDataSource::Cache,
        key: self.key.clone(),
      },
      Err(e) => CacheableResultWrapper::Error {
        error: SharedError::from(e),
        source: CacheableDataSource::Cache,
        key: self.key.clone(),
      },
    };

    self
      .logger
      .debug(LOG_TAG, || format!("Returning #get_cached {}", result));
    result
  }

  /// Cached value; on a miss or read failure, fresh data instead.
  ///
  /// Never `Empty`.
  pub async fn get_cached_or_new(&self, cache_new_value: bool) -> CacheableResultWrapper<T> {
    self.logger.debug(LOG_TAG, || {
      format!(
        "Getting #get_cached_or_new for {} with key {}",
        T::cache_type(),
        self.key
      )
    });

    let cached = self.get_cached().await;
    if cached.is_success() {
      return cached;
    }
    self.get_new(cache_new_value).await
  }

  /// Fresh data; on a fetch failure, the cached value instead.
  ///
  /// `Empty` when the fetch failed and the cache holds nothing.
  pub async fn get_new_or_cached(&self, cache_new_value: bool) -> CacheableResultWrapper<T> {
    self.logger.debug(LOG_TAG, || {
      format!(
        "Getting #get_new_or_cached for {} with key {}",
        T::cache_type(),
        self.key
      )
    });

    let new = self.get_new(cache_new_value).await;
    if new.is_success() {
      return new;
    }
    self.get_cached().await
  }

  /// The cached result followed by the fresh one.
  ///
  /// The stream is lazy: nothing is read or fetched until it is polled. With
  /// `emit_only_success_cache`, a cache result that is not a success is
  /// skipped; the fresh result is always emitted.
  pub fn get_cached_and_new(
    &self,
    cache_new_value: bool,
    emit_only_success_cache: bool,
  ) -> BoxStream<'_, CacheableResultWrapper<T>> {
    self.logger.debug(LOG_TAG, || {
      format!(
        "Getting #get_cached_and_new for {} with key {}, cache_new_value {} and emit_only_success_cache {}",
        T::cache_type(),
        self.key,
        cache_new_value,
        emit_only_success_cache
      )
    });

    let cached = stream::once(self.get_cached()).filter_map(move |result| async move {
      if emit_only_success_cache {
        result.into_success()
      } else {
        Some(result)
      }
    });
    let new = stream::once(self.get_new(cache_new_value));

    cached.chain(new).boxed()
  }
}

/// Convenience constructor on shared cache backends.
pub trait CacheableDataExt<C> {
  fn cacheable<T, F, Fut>(&self, key: CacheableUniqueCacheKey, fetcher: F) -> CacheableData<C, T>
  where
    T: Cacheable + std::fmt::Debug,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static;
}

impl<C: CacheableDataCache + 'static> CacheableDataExt<C> for Arc<C> {
  fn cacheable<T, F, Fut>(&self, key: CacheableUniqueCacheKey, fetcher: F) -> CacheableData<C, T>
  where
    T: Cacheable + std::fmt::Debug,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    CacheableData::new(Arc::clone(self), key, fetcher)
  }
}
