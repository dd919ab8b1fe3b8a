//! Cache-or-fetch data retrieval.
//!
//! This module wraps a "fetch new" function and a cache backend into a
//! [`CacheableData`] that can:
//! - Fetch fresh data and optionally store it
//! - Serve the cached value, reporting a miss as `Empty` rather than an error
//! - Fall back from cache to network or from network to cache
//! - Stream the cached value followed by the fresh one
//!
//! Every result carries its source (`Cache` or `New`) and the request key.

mod layer;
mod storage;
mod traits;

pub use layer::{CacheableData, CacheableDataExt};
pub use storage::{CacheableDataCache, MemoryCache, NoopCache, SqliteCache};
pub use traits::{Cacheable, CacheableDataSource, CacheableResultWrapper, CacheableUniqueCacheKey};
