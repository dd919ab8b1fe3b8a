//! Application-state primitives for interactive clients.
//!
//! - [`cache`]: wrap a fetch function and a cache backend, then read the value
//!   through one of five cache/network strategies.
//! - [`pager`]: load a remote list page by page as items are rendered and
//!   publish every transition on a state stream.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod pager;

pub use config::{Config, PagerConfig};
pub use error::{CrutchError, SharedError};
pub use logging::{LogWriter, Logger, NoopWriter, TracingWriter};
