//! Injectable log sink used by the cache and pager components.
//!
//! Components never log through global state. Each one receives a [`Logger`]
//! at construction; the logger is disabled until [`Logger::set_enabled`] is
//! called, and message closures are only evaluated while it is enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

use crate::error::SharedError;

/// Destination for library log lines.
///
/// Implementations must not block and must not panic.
pub trait LogWriter: Send + Sync {
  fn log(&self, level: Level, tag: &str, message: &str, error: Option<&SharedError>);
}

/// Forwards every line to `tracing`, with the tag as a structured field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWriter;

impl LogWriter for TracingWriter {
  fn log(&self, level: Level, tag: &str, message: &str, error: Option<&SharedError>) {
    let error = error.map(|e| e.to_string());
    match level {
      Level::ERROR => tracing::error!(tag, error = error.as_deref(), "{}", message),
      Level::WARN => tracing::warn!(tag, error = error.as_deref(), "{}", message),
      Level::INFO => tracing::info!(tag, error = error.as_deref(), "{}", message),
      Level::DEBUG => tracing::debug!(tag, error = error.as_deref(), "{}", message),
      _ => tracing::trace!(tag, error = error.as_deref(), "{}", message),
    }
  }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWriter;

impl LogWriter for NoopWriter {
  fn log(&self, _level: Level, _tag: &str, _message: &str, _error: Option<&SharedError>) {}
}

/// Cloneable logging handle with a runtime on/off toggle.
///
/// Clones share the toggle, so enabling logging on one clone enables it for
/// every component that was handed the same logger.
#[derive(Clone)]
pub struct Logger {
  writer: Arc<dyn LogWriter>,
  enabled: Arc<AtomicBool>,
}

impl Logger {
  /// Create a disabled logger writing to `writer`.
  pub fn new(writer: impl LogWriter + 'static) -> Self {
    Self {
      writer: Arc::new(writer),
      enabled: Arc::new(AtomicBool::new(false)),
    }
  }

  /// A logger that never writes anything.
  pub fn noop() -> Self {
    Self::new(NoopWriter)
  }

  /// Builder-style toggle.
  pub fn enabled(self, enabled: bool) -> Self {
    self.set_enabled(enabled);
    self
  }

  pub fn set_enabled(&self, enabled: bool) {
    self.enabled.store(enabled, Ordering::Relaxed);
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::Relaxed)
  }

  pub fn debug(&self, tag: &str, message: impl FnOnce() -> String) {
    self.write(Level::DEBUG, tag, message, None);
  }

  pub fn warn(&self, tag: &str, message: impl FnOnce() -> String, error: Option<&SharedError>) {
    self.write(Level::WARN, tag, message, error);
  }

  pub fn error(&self, tag: &str, message: impl FnOnce() -> String, error: Option<&SharedError>) {
    self.write(Level::ERROR, tag, message, error);
  }

  fn write(
    &self,
    level: Level,
    tag: &str,
    message: impl FnOnce() -> String,
    error: Option<&SharedError>,
  ) {
    if self.is_enabled() {
      self.writer.log(level, tag, &message(), error);
    }
  }
}

impl Default for Logger {
  fn default() -> Self {
    Self::new(TracingWriter)
  }
}

impl std::fmt::Debug for Logger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Logger")
      .field("enabled", &self.is_enabled())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Writer that keeps every line, for assertions.
  #[derive(Clone, Default)]
  pub(crate) struct RecordingWriter {
    pub(crate) lines: Arc<Mutex<Vec<(Level, String, String)>>>,
  }

  impl RecordingWriter {
    pub(crate) fn messages(&self) -> Vec<String> {
      self
        .lines
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, message)| message.clone())
        .collect()
    }
  }

  impl LogWriter for RecordingWriter {
    fn log(&self, level: Level, tag: &str, message: &str, _error: Option<&SharedError>) {
      self
        .lines
        .lock()
        .unwrap()
        .push((level, tag.to_string(), message.to_string()));
    }
  }

  #[test]
  fn test_logger_is_disabled_by_default() {
    let writer = RecordingWriter::default();
    let logger = Logger::new(writer.clone());

    logger.debug("Test", || "hidden".to_string());

    assert!(!logger.is_enabled());
    assert!(writer.messages().is_empty());
  }

  #[test]
  fn test_disabled_logger_does_not_build_message() {
    let logger = Logger::new(NoopWriter);
    logger.debug("Test", || panic!("message closure must not run"));
  }

  #[test]
  fn test_toggle_is_shared_between_clones() {
    let writer = RecordingWriter::default();
    let logger = Logger::new(writer.clone());
    let clone = logger.clone();

    logger.set_enabled(true);
    clone.warn("Test", || "visible".to_string(), None);

    assert_eq!(writer.messages(), vec!["visible".to_string()]);
    let lines = writer.lines.lock().unwrap();
    assert_eq!(lines[0].0, Level::WARN);
    assert_eq!(lines[0].1, "Test");
  }
}
