//! Error types shared by the cache and pager modules.

use color_eyre::Report;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::CacheableUniqueCacheKey;

/// Failures raised by the library itself, as opposed to failures of the
/// fetchers and cache backends it wraps.
#[derive(Error, Debug, Clone)]
pub enum CrutchError {
  /// `success_data_or_throw` was called on an `Empty` result.
  #[error("Empty cache for key: {0}")]
  EmptyCache(CacheableUniqueCacheKey),

  /// The caller reported that the network is unavailable.
  #[error("No internet connection")]
  NoConnection,

  /// `success_data_or_throw` was called on an `Error` result.
  #[error(transparent)]
  Failed(#[from] SharedError),

  /// The pager task is gone and could not answer.
  #[error("Pager is no longer running")]
  PagerClosed,

  /// A refresh of all pages was dropped because the pager was reset, a
  /// newer refresh started, or a fetch stored newer pages meanwhile.
  #[error("Refresh was superseded by newer page data")]
  RefreshSuperseded,
}

/// A caught failure that can be cloned into every result or state that
/// carries it.
#[derive(Clone)]
pub struct SharedError(Arc<Report>);

impl SharedError {
  /// The underlying report.
  pub fn report(&self) -> &Report {
    &self.0
  }

  /// Attempt to downcast the root failure to a concrete error type.
  pub fn downcast_ref<E>(&self) -> Option<&E>
  where
    E: fmt::Display + fmt::Debug + Send + Sync + 'static,
  {
    self.0.downcast_ref::<E>()
  }
}

impl From<Report> for SharedError {
  fn from(report: Report) -> Self {
    Self(Arc::new(report))
  }
}

impl From<CrutchError> for SharedError {
  fn from(error: CrutchError) -> Self {
    Self(Arc::new(Report::new(error)))
  }
}

impl fmt::Debug for SharedError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&*self.0, f)
  }
}

impl fmt::Display for SharedError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&*self.0, f)
  }
}

impl std::error::Error for SharedError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    self.0.source()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  #[test]
  fn test_empty_cache_message_with_sub_key() {
    let key = CacheableUniqueCacheKey::with_sub_key("mainKey", "subKey");
    let error = CrutchError::EmptyCache(key);
    assert_eq!(error.to_string(), "Empty cache for key: mainKey/subKey");
  }

  #[test]
  fn test_empty_cache_message_without_sub_key() {
    let error = CrutchError::EmptyCache(CacheableUniqueCacheKey::new("mainKey"));
    assert_eq!(error.to_string(), "Empty cache for key: mainKey/-");
  }

  #[test]
  fn test_shared_error_keeps_original_message() {
    let shared = SharedError::from(eyre!("Cant read disk"));
    let cloned = shared.clone();
    assert_eq!(cloned.to_string(), "Cant read disk");
    assert!(Arc::ptr_eq(&shared.0, &cloned.0));
  }

  #[test]
  fn test_shared_error_downcasts_to_library_error() {
    let shared = SharedError::from(CrutchError::NoConnection);
    assert!(matches!(
      shared.downcast_ref::<CrutchError>(),
      Some(CrutchError::NoConnection)
    ));
  }

  #[test]
  fn test_failed_is_transparent() {
    let error = CrutchError::from(SharedError::from(eyre!("boom")));
    assert_eq!(error.to_string(), "boom");
  }
}
