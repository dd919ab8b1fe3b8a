//! Synthetic backends and runners behind the `crutch` binary.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crutch::cache::{
  Cacheable, CacheableData, CacheableDataCache, CacheableUniqueCacheKey, NoopCache, SqliteCache,
};
use crutch::config::Config;
use crutch::logging::Logger;
use crutch::pager::{PageSource, Pager, PagerFlags, PagerItemType, PagerStates, PagingItemsData};

const PAGE_LATENCY: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoItem {
  pub number: u32,
  pub title: String,
}

impl PagerItemType for DemoItem {
  fn id(&self) -> String {
    self.number.to_string()
  }
}

/// Numbered items `1..=total`, served with a small delay. `fail_page`
/// fails on its first request only.
pub struct DemoSource {
  total: u32,
  page_size: u32,
  fail_page: Option<u32>,
  failed: AtomicBool,
}

impl DemoSource {
  pub fn new(total: u32, page_size: u32, fail_page: Option<u32>) -> Self {
    Self {
      total,
      page_size: page_size.max(1),
      fail_page,
      failed: AtomicBool::new(false),
    }
  }
}

#[async_trait::async_trait]
impl PageSource<DemoItem> for DemoSource {
  async fn get_page(&self, page_number: u32) -> Result<PagingItemsData<DemoItem>> {
    tokio::time::sleep(PAGE_LATENCY).await;

    if self.fail_page == Some(page_number) && !self.failed.swap(true, Ordering::SeqCst) {
      return Err(eyre!("simulated failure for page {}", page_number));
    }

    let first = page_number.saturating_sub(1).saturating_mul(self.page_size).saturating_add(1);
    let last = page_number.saturating_mul(self.page_size).min(self.total);
    let items = (first..=last)
      .map(|number| DemoItem {
        number,
        title: format!("Item {number}"),
      })
      .collect();
    Ok(PagingItemsData::new(self.total, items))
  }
}

/// Page through a synthetic list, rendering the last item of every page,
/// until no pages are left.
pub async fn run_pages(
  config: &Config,
  total: u32,
  page_size: Option<u32>,
  fail_page: Option<u32>,
) -> Result<()> {
  let mut pager_config = config.pager;
  if let Some(page_size) = page_size {
    pager_config = pager_config.with_page_size(page_size);
  }

  let logger = Logger::default().enabled(config.logging.enabled);
  let source = DemoSource::new(total, pager_config.page_size, fail_page);
  let pager = Pager::with_logger(Arc::new(source), pager_config, logger)?;
  let mut states = pager.listen_for_paging_states();

  pager.get_first_page(None, false).await?;

  while let Some(state) = states.next().await {
    println!("{state}");
    match &state {
      PagerStates::Loading { .. } => {}
      PagerStates::Success { .. } => {
        let rendered = state.items().len() as u32;
        if rendered == 0 {
          println!("no items");
          break;
        }
        pager.on_item_rendered(rendered - 1, None);
      }
      PagerStates::Error { flag, .. } => {
        if *flag == PagerFlags::Initial {
          pager.get_first_page(None, false).await?;
        } else {
          let rendered = state.items().len() as u32;
          pager.on_item_rendered(rendered.saturating_sub(1), None);
        }
      }
      PagerStates::NoMorePagesAvailable { .. } => {
        let items = state.items();
        match items.last() {
          Some(last) => println!("loaded {} items, last is {:?}", items.len(), last.title),
          None => println!("loaded no items"),
        }
        break;
      }
    }
  }

  Ok(())
}

/// The value served by the `cache` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub key: String,
  pub sequence: u64,
  pub fetched_at: DateTime<Utc>,
}

impl Cacheable for Snapshot {
  fn cache_type() -> &'static str {
    "snapshot"
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
  New,
  Cached,
  CachedOrNew,
  NewOrCached,
  CachedAndNew,
}

/// Run one strategy against the configured cache backend.
pub async fn run_cache(
  config: &Config,
  key: CacheableUniqueCacheKey,
  strategy: Strategy,
  cache_new_value: bool,
) -> Result<()> {
  let logger = Logger::default().enabled(config.logging.enabled);

  if !config.cache.enabled {
    return run_strategy(Arc::new(NoopCache), key, strategy, cache_new_value, logger).await;
  }

  let cache = Arc::new(match &config.cache.path {
    Some(path) => SqliteCache::open_at(path)?,
    None => SqliteCache::open()?,
  });
  run_strategy(Arc::clone(&cache), key.clone(), strategy, cache_new_value, logger).await?;

  match cache.cached_at::<Snapshot>(&key)? {
    Some(at) => println!("cached at {}", at.to_rfc3339()),
    None => println!("nothing cached for {key}"),
  }
  Ok(())
}

async fn run_strategy<C: CacheableDataCache + 'static>(
  cache: Arc<C>,
  key: CacheableUniqueCacheKey,
  strategy: Strategy,
  cache_new_value: bool,
  logger: Logger,
) -> Result<()> {
  let sequence = Arc::new(AtomicU64::new(0));
  let label = key.to_string();
  let data = CacheableData::new(cache, key, move || {
    fetch_snapshot(label.clone(), Arc::clone(&sequence))
  })
  .with_logger(logger);

  match strategy {
    Strategy::New => println!("{}", data.get_new(cache_new_value).await),
    Strategy::Cached => println!("{}", data.get_cached().await),
    Strategy::CachedOrNew => println!("{}", data.get_cached_or_new(cache_new_value).await),
    Strategy::NewOrCached => println!("{}", data.get_new_or_cached(cache_new_value).await),
    Strategy::CachedAndNew => {
      let mut results = data.get_cached_and_new(cache_new_value, false);
      while let Some(result) = results.next().await {
        println!("{result}");
      }
    }
  }
  Ok(())
}

async fn fetch_snapshot(key: String, sequence: Arc<AtomicU64>) -> Result<Snapshot> {
  tokio::time::sleep(PAGE_LATENCY).await;
  Ok(Snapshot {
    key,
    sequence: sequence.fetch_add(1, Ordering::SeqCst) + 1,
    fetched_at: Utc::now(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crutch::cache::MemoryCache;

  #[tokio::test]
  async fn test_demo_source_pages_and_fails_once() {
    let source = DemoSource::new(5, 2, Some(2));

    let first = source.get_page(1).await.unwrap();
    assert_eq!(first.total_items_number, 5);
    assert_eq!(first.items.len(), 2);

    assert!(source.get_page(2).await.is_err());
    let second = source.get_page(2).await.unwrap();
    assert_eq!(second.items[0].number, 3);

    let last = source.get_page(3).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].title, "Item 5");
  }

  #[tokio::test]
  async fn test_run_pages_recovers_from_a_failed_page() {
    let config = Config::default();
    run_pages(&config, 7, Some(3), Some(2)).await.unwrap();
  }

  #[tokio::test]
  async fn test_run_strategy_against_memory_cache() {
    let cache = Arc::new(MemoryCache::new());
    let key = CacheableUniqueCacheKey::with_sub_key("demo", "1");

    run_strategy(Arc::clone(&cache), key.clone(), Strategy::New, true, Logger::noop())
      .await
      .unwrap();
    let stored: Option<Snapshot> = cache.get_value(&key).await.unwrap();
    assert_eq!(stored.map(|s| s.sequence), Some(1));
  }

  #[tokio::test]
  async fn test_run_cache_with_cache_disabled() {
    let mut config = Config::default();
    config.cache.enabled = false;
    run_cache(
      &config,
      CacheableUniqueCacheKey::new("demo"),
      Strategy::CachedAndNew,
      true,
    )
    .await
    .unwrap();
  }
}
