//! Page-by-page loading of a remote list.
//!
//! A [`Pager`] fetches pages from a [`PageSource`] as items are rendered,
//! accumulates them, and publishes every transition as a [`PagerStates`]
//! value on a replaying state stream.

mod actor;
mod channel;
mod handle;
mod types;

use async_trait::async_trait;
use color_eyre::Result;
use futures::future::BoxFuture;

pub use channel::StateChannel;
pub use handle::Pager;
pub use types::{
  flatten_to_item_list, page_for_item, PageMap, PagerFlags, PagerItemType, PagerStates,
  PagingItemsData,
};

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Backend a [`Pager`] fetches pages from.
#[async_trait]
pub trait PageSource<I>: Send + Sync {
  /// Fetch the 1-based `page_number`.
  async fn get_page(&self, page_number: u32) -> Result<PagingItemsData<I>>;
}

/// Adapts a closure returning a boxed future into a [`PageSource`].
pub struct PageFn<F>(pub F);

#[async_trait]
impl<I, F> PageSource<I> for PageFn<F>
where
  I: Send + 'static,
  F: Fn(u32) -> BoxFuture<'static, Result<PagingItemsData<I>>> + Send + Sync,
{
  async fn get_page(&self, page_number: u32) -> Result<PagingItemsData<I>> {
    (self.0)(page_number).await
  }
}
