use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pager::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
  #[serde(default)]
  pub pager: PagerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

/// Paging behaviour of a [`Pager`](crate::pager::Pager).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PagerConfig {
  /// Items per page
  pub page_size: u32,
  /// How many items before the end of the held pages the next page is
  /// requested; 0 means only the last item triggers it
  pub item_offset_before_next_page: u32,
  /// How many states a slow subscriber may fall behind before skipping
  pub state_buffer: usize,
}

impl Default for PagerConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      item_offset_before_next_page: 0,
      state_buffer: 64,
    }
  }
}

impl PagerConfig {
  pub fn with_page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn with_item_offset(mut self, item_offset_before_next_page: u32) -> Self {
    self.item_offset_before_next_page = item_offset_before_next_page;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.page_size == 0 {
      return Err(eyre!("pager.page_size must be at least 1"));
    }
    if self.state_buffer == 0 {
      return Err(eyre!("pager.state_buffer must be at least 1"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is cached
  pub enabled: bool,
  /// SQLite database location (defaults to $XDG_DATA_HOME/crutch/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
  /// Initial state of the library logger toggle
  pub enabled: bool,
  /// Write logs to daily files in this directory instead of stderr
  pub directory: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./crutch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/crutch/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("crutch.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("crutch").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.pager.validate()?;
    Ok(config)
  }
}
