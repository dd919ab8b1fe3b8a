//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CrutchError, SharedError};

/// Trait for values that can be stored in a [`CacheableDataCache`](super::CacheableDataCache).
///
/// The cache is keyed by `(cache_type, key)`, so two value types stored under
/// the same [`CacheableUniqueCacheKey`] never collide.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Value type tag for storage organization (e.g., "user_profile").
  ///
  /// Persisted as part of the SQLite key, so it must never change between
  /// releases of the program that wrote the entry.
  fn cache_type() -> &'static str;
}

impl Cacheable for String {
  fn cache_type() -> &'static str {
    "string"
  }
}

impl Cacheable for bool {
  fn cache_type() -> &'static str {
    "bool"
  }
}

impl Cacheable for i64 {
  fn cache_type() -> &'static str {
    "i64"
  }
}

impl Cacheable for u64 {
  fn cache_type() -> &'static str {
    "u64"
  }
}

/// Identifies a cached value.
///
/// `main_key` names what is cached (e.g. "UserProfile"), `sub_key` optionally
/// narrows it (e.g. a user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheableUniqueCacheKey {
  pub main_key: String,
  pub sub_key: Option<String>,
}

impl CacheableUniqueCacheKey {
  pub fn new(main_key: impl Into<String>) -> Self {
    Self {
      main_key: main_key.into(),
      sub_key: None,
    }
  }

  pub fn with_sub_key(main_key: impl Into<String>, sub_key: impl Into<String>) -> Self {
    Self {
      main_key: main_key.into(),
      sub_key: Some(sub_key.into()),
    }
  }

  /// Stable, fixed-length digest of the key pair for storage backends.
  ///
  /// A missing sub key and an empty one hash differently.
  pub fn storage_key(&self) -> String {
    let input = match &self.sub_key {
      Some(sub_key) => format!("{}\u{1f}{}", self.main_key, sub_key),
      None => format!("{}\u{1e}", self.main_key),
    };
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheableUniqueCacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}",
      self.main_key,
      self.sub_key.as_deref().unwrap_or("-")
    )
  }
}

/// Indicates where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheableDataSource {
  /// Read from the cache backend
  Cache,
  /// Produced by the fetcher
  New,
}

impl fmt::Display for CacheableDataSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Cache => f.write_str("CACHE"),
      Self::New => f.write_str("NEW"),
    }
  }
}

/// Outcome of a single retrieval, tagged with its source and key.
///
/// `Empty` is only ever produced by a cache miss; it is not a failure.
#[derive(Debug, Clone)]
pub enum CacheableResultWrapper<T> {
  Success {
    data: T,
    source: CacheableDataSource,
    key: CacheableUniqueCacheKey,
  },
  Error {
    error: SharedError,
    source: CacheableDataSource,
    key: CacheableUniqueCacheKey,
  },
  Empty {
    source: CacheableDataSource,
    key: CacheableUniqueCacheKey,
  },
}

impl<T> CacheableResultWrapper<T> {
  pub fn source(&self) -> CacheableDataSource {
    match self {
      Self::Success { source, .. } | Self::Error { source, .. } | Self::Empty { source, .. } => {
        *source
      }
    }
  }

  pub fn key(&self) -> &CacheableUniqueCacheKey {
    match self {
      Self::Success { key, .. } | Self::Error { key, .. } | Self::Empty { key, .. } => key,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. })
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Self::Error { .. })
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Self::Empty { .. })
  }

  /// Success data, if any.
  pub fn data(&self) -> Option<&T> {
    match self {
      Self::Success { data, .. } => Some(data),
      _ => None,
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      Self::Success { data, .. } => Some(data),
      _ => None,
    }
  }

  /// The caught failure, if any.
  pub fn error(&self) -> Option<&SharedError> {
    match self {
      Self::Error { error, .. } => Some(error),
      _ => None,
    }
  }

  /// `self` if it is a success, otherwise `other`.
  pub fn success_or(self, other: Self) -> Self {
    if self.is_success() {
      self
    } else {
      other
    }
  }

  /// `Some(self)` only for a success.
  pub fn into_success(self) -> Option<Self> {
    if self.is_success() {
      Some(self)
    } else {
      None
    }
  }

  /// Success data, or the reason there is none.
  ///
  /// An empty cache is reported as [`CrutchError::EmptyCache`], a caught
  /// failure as [`CrutchError::Failed`] wrapping the original error.
  pub fn success_data_or_throw(self) -> Result<T, CrutchError> {
    match self {
      Self::Success { data, .. } => Ok(data),
      Self::Error { error, .. } => Err(CrutchError::Failed(error)),
      Self::Empty { key, .. } => Err(CrutchError::EmptyCache(key)),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheableResultWrapper<U> {
    match self {
      Self::Success { data, source, key } => CacheableResultWrapper::Success {
        data: f(data),
        source,
        key,
      },
      Self::Error { error, source, key } => CacheableResultWrapper::Error { error, source, key },
      Self::Empty { source, key } => CacheableResultWrapper::Empty { source, key },
    }
  }
}

impl<T: fmt::Debug> fmt::Display for CacheableResultWrapper<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Success { data, source, key } => write!(f, "Success({data:?}) from {source} [{key}]"),
      Self::Error { error, source, key } => write!(f, "Error({error}) from {source} [{key}]"),
      Self::Empty { source, key } => write!(f, "Empty from {source} [{key}]"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  fn key() -> CacheableUniqueCacheKey {
    CacheableUniqueCacheKey::new("TESTKEY")
  }

  #[test]
  fn test_success_data() {
    let result = CacheableResultWrapper::Success {
      data: "abc".to_string(),
      source: CacheableDataSource::Cache,
      key: key(),
    };
    assert_eq!(result.data().map(String::as_str), Some("abc"));
    assert_eq!(result.source(), CacheableDataSource::Cache);
    assert_eq!(result.into_data(), Some("abc".to_string()));
  }

  #[test]
  fn test_error_has_no_data() {
    let result: CacheableResultWrapper<String> = CacheableResultWrapper::Error {
      error: eyre!("nope").into(),
      source: CacheableDataSource::New,
      key: key(),
    };
    assert!(result.data().is_none());
    assert_eq!(result.error().map(ToString::to_string).as_deref(), Some("nope"));
  }

  #[test]
  fn test_throw_on_empty_names_the_key() {
    let result: CacheableResultWrapper<String> = CacheableResultWrapper::Empty {
      source: CacheableDataSource::Cache,
      key: CacheableUniqueCacheKey::with_sub_key("mainKey", "subKey"),
    };
    match result.success_data_or_throw() {
      Err(CrutchError::EmptyCache(key)) => assert_eq!(key.sub_key.as_deref(), Some("subKey")),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_throw_on_error_returns_original() {
    let result: CacheableResultWrapper<String> = CacheableResultWrapper::Error {
      error: eyre!("Cant read disk").into(),
      source: CacheableDataSource::Cache,
      key: key(),
    };
    let error = result.success_data_or_throw().unwrap_err();
    assert!(matches!(error, CrutchError::Failed(_)));
    assert_eq!(error.to_string(), "Cant read disk");
  }

  #[test]
  fn test_throw_on_success_returns_data() {
    let result = CacheableResultWrapper::Success {
      data: 7_i64,
      source: CacheableDataSource::New,
      key: key(),
    };
    assert_eq!(result.success_data_or_throw().unwrap(), 7);
  }

  #[test]
  fn test_success_or_prefers_success() {
    let empty: CacheableResultWrapper<i64> = CacheableResultWrapper::Empty {
      source: CacheableDataSource::Cache,
      key: key(),
    };
    let success = CacheableResultWrapper::Success {
      data: 1,
      source: CacheableDataSource::New,
      key: key(),
    };
    assert!(empty.clone().success_or(success.clone()).is_success());
    assert_eq!(
      success.clone().success_or(empty.clone()).source(),
      CacheableDataSource::New
    );
    assert!(empty.into_success().is_none());
    assert!(success.into_success().is_some());
  }

  #[test]
  fn test_storage_key_distinguishes_missing_and_empty_sub_key() {
    let none = CacheableUniqueCacheKey::new("main");
    let empty = CacheableUniqueCacheKey::with_sub_key("main", "");
    assert_ne!(none.storage_key(), empty.storage_key());
    assert_eq!(none.storage_key(), CacheableUniqueCacheKey::new("main").storage_key());
    assert_eq!(none.storage_key().len(), 64);
  }

  #[test]
  fn test_key_display() {
    assert_eq!(CacheableUniqueCacheKey::new("a").to_string(), "a/-");
    assert_eq!(CacheableUniqueCacheKey::with_sub_key("a", "b").to_string(), "a/b");
  }

  #[test]
  fn test_builtin_cache_types_are_fixed_tags() {
    assert_eq!(String::cache_type(), "string");
    assert_eq!(bool::cache_type(), "bool");
    assert_eq!(i64::cache_type(), "i64");
    assert_eq!(u64::cache_type(), "u64");
  }
}
