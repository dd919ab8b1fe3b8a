//! Paging data types and the page arithmetic shared by the pager.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::SharedError;

/// Items handled by the pager must carry a stable id, used to drop
/// duplicates when pages are flattened into one list.
pub trait PagerItemType: Clone + Send + Sync + 'static {
  fn id(&self) -> String;
}

/// One fetched page plus the backend's total item count at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingItemsData<I> {
  pub total_items_number: u32,
  pub items: Vec<I>,
}

impl<I> PagingItemsData<I> {
  pub fn new(total_items_number: u32, items: Vec<I>) -> Self {
    Self {
      total_items_number,
      items,
    }
  }
}

/// Fetched pages keyed by their 1-based page number.
pub type PageMap<I> = BTreeMap<u32, PagingItemsData<I>>;

/// Why a page fetch was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PagerFlags {
  Initial,
  Paging,
  SwipeToRefresh,
  RefreshingAllPages,
}

/// States published by the pager. Every state carries a snapshot of all
/// pages fetched so far.
#[derive(Debug, Clone)]
pub enum PagerStates<I> {
  /// A page is being fetched. Page 1 usually means a screen init.
  Loading {
    page_number: u32,
    flag: PagerFlags,
    current_items: PageMap<I>,
  },
  /// The fetch failed; `current_items` is untouched.
  Error {
    error: SharedError,
    flag: PagerFlags,
    current_items: PageMap<I>,
  },
  Success {
    flag: PagerFlags,
    current_items: PageMap<I>,
  },
  /// A fetch was requested for a page that does not exist or is already held.
  NoMorePagesAvailable { current_items: PageMap<I> },
}

impl<I> PagerStates<I> {
  pub fn current_items(&self) -> &PageMap<I> {
    match self {
      Self::Loading { current_items, .. }
      | Self::Error { current_items, .. }
      | Self::Success { current_items, .. }
      | Self::NoMorePagesAvailable { current_items } => current_items,
    }
  }

  pub fn flag(&self) -> Option<PagerFlags> {
    match self {
      Self::Loading { flag, .. } | Self::Error { flag, .. } | Self::Success { flag, .. } => {
        Some(*flag)
      }
      Self::NoMorePagesAvailable { .. } => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, Self::Loading { .. })
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. })
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Self::Error { .. })
  }

  pub fn error(&self) -> Option<&SharedError> {
    match self {
      Self::Error { error, .. } => Some(error),
      _ => None,
    }
  }

  /// Short name of the variant, for logs.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Loading { .. } => "Loading",
      Self::Error { .. } => "Error",
      Self::Success { .. } => "Success",
      Self::NoMorePagesAvailable { .. } => "NoMorePagesAvailable",
    }
  }
}

impl<I: PagerItemType> PagerStates<I> {
  /// All held items in page order, without duplicates.
  pub fn items(&self) -> Vec<I> {
    flatten_to_item_list(self.current_items())
  }
}

impl<I> fmt::Display for PagerStates<I> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let pages: Vec<_> = self.current_items().keys().collect();
    match self {
      Self::Loading {
        page_number, flag, ..
      } => write!(f, "Loading(page {page_number}, {flag:?}) pages {pages:?}"),
      Self::Error { error, flag, .. } => write!(f, "Error({error}, {flag:?}) pages {pages:?}"),
      Self::Success { flag, .. } => write!(f, "Success({flag:?}) pages {pages:?}"),
      Self::NoMorePagesAvailable { .. } => write!(f, "NoMorePagesAvailable pages {pages:?}"),
    }
  }
}

/// Flatten pages into one list in page order, keeping the first occurrence
/// of every id.
pub fn flatten_to_item_list<I: PagerItemType>(pages: &PageMap<I>) -> Vec<I> {
  let mut seen = HashSet::new();
  pages
    .values()
    .flat_map(|page| page.items.iter())
    .filter(|item| seen.insert(item.id()))
    .cloned()
    .collect()
}

/// Page holding the given 1-based item number.
///
/// Item numbers of 0 map to page 1. When `total_pages` is known the result
/// never exceeds it.
pub fn page_for_item(item_number: u32, page_size: u32, total_pages: Option<u32>) -> u32 {
  let page = if item_number == 0 {
    1
  } else {
    item_number.div_ceil(page_size.max(1))
  };
  match total_pages {
    Some(total) => page.min(total.max(1)),
    None => page,
  }
}
