//! The task that owns all mutable pager state.
//!
//! Handles send [`Command`]s; page fetches run on their own tasks and report
//! back as [`Completion`]s. Only this task mutates pages and counters, and
//! only this task emits states, so emissions are strictly ordered.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::channel::StateChannel;
use super::types::{page_for_item, PageMap, PagerFlags, PagerItemType, PagerStates, PagingItemsData};
use super::PageSource;
use crate::config::PagerConfig;
use crate::error::{CrutchError, SharedError};
use crate::logging::Logger;
use color_eyre::{eyre::eyre, Result};

const LOG_TAG: &str = "Pager";

pub(crate) enum Command<I> {
  FirstPage {
    is_network_available: Option<bool>,
    reset_before_first_page: bool,
    done: oneshot::Sender<()>,
  },
  SwipeToRefresh {
    is_network_available: Option<bool>,
  },
  ItemRendered {
    index: u32,
    is_network_available: Option<bool>,
  },
  PageFromItemNumber {
    item_number: u32,
    reply: oneshot::Sender<u32>,
  },
  RefreshAllPages {
    reply: oneshot::Sender<Result<(), CrutchError>>,
  },
  CleanAll {
    config: Option<PagerConfig>,
    done: oneshot::Sender<()>,
  },
  IsAnyPageLoaded {
    reply: oneshot::Sender<bool>,
  },
  Snapshot {
    reply: oneshot::Sender<PageMap<I>>,
  },
}

pub(crate) enum Completion<I> {
  Page {
    generation: u64,
    page_number: u32,
    flag: PagerFlags,
    reset_before_success: bool,
    result: Result<PagingItemsData<I>, SharedError>,
  },
  Refresh {
    id: u64,
    result: Result<Vec<(u32, PagingItemsData<I>)>, SharedError>,
  },
}

/// A running refresh of every held page.
struct RefreshJob {
  id: u64,
  /// `data_epoch` when the refresh started
  epoch: u64,
  handle: JoinHandle<()>,
  reply: oneshot::Sender<Result<(), CrutchError>>,
}

pub(crate) struct PagerActor<I, S> {
  source: Arc<S>,
  config: PagerConfig,
  actual_page: u32,
  total_pages: Option<u32>,
  total_items_count: u32,
  paged_items: PageMap<I>,
  /// The in-flight fetch; cleared once its completion has been applied
  page_fetching_job: Option<JoinHandle<()>>,
  /// Bumped on every reset so completions of older fetches are ignored
  generation: u64,
  /// Bumped whenever held pages are cleared or a fetch stores a page, so a
  /// refresh never overwrites newer data
  data_epoch: u64,
  refresh_job: Option<RefreshJob>,
  next_refresh_id: u64,
  states: Arc<StateChannel<PagerStates<I>>>,
  commands: mpsc::UnboundedReceiver<Command<I>>,
  completions: mpsc::UnboundedReceiver<Completion<I>>,
  completion_tx: mpsc::UnboundedSender<Completion<I>>,
  logger: Logger,
}

impl<I, S> PagerActor<I, S>
where
  I: PagerItemType,
  S: PageSource<I> + 'static,
{
  pub(crate) fn new(
    source: Arc<S>,
    config: PagerConfig,
    states: Arc<StateChannel<PagerStates<I>>>,
    commands: mpsc::UnboundedReceiver<Command<I>>,
    logger: Logger,
  ) -> Self {
    let (completion_tx, completions) = mpsc::unbounded_channel();
    Self {
      source,
      config,
      actual_page: 1,
      total_pages: None,
      total_items_count: 1,
      paged_items: PageMap::new(),
      page_fetching_job: None,
      generation: 0,
      data_epoch: 0,
      refresh_job: None,
      next_refresh_id: 0,
      states,
      commands,
      completions,
      completion_tx,
      logger,
    }
  }

  /// Process commands until every handle is dropped.
  pub(crate) async fn run(mut self) {
    loop {
      tokio::select! {
        command = self.commands.recv() => match command {
          Some(command) => self.handle_command(command).await,
          None => break,
        },
        Some(completion) = self.completions.recv() => self.handle_completion(completion),
      }
    }

    if let Some(job) = self.page_fetching_job.take() {
      job.abort();
    }
    if let Some(refresh) = self.refresh_job.take() {
      refresh.handle.abort();
    }
    self.log(|| "all handles dropped, pager stopped".to_string());
  }

  async fn handle_command(&mut self, command: Command<I>) {
    match command {
      Command::FirstPage {
        is_network_available,
        reset_before_first_page,
        done,
      } => {
        if reset_before_first_page {
          self.reset().await;
        }
        self.get_next_page(PagerFlags::Initial, 1, false, is_network_available, true);
        let _ = done.send(());
      }
      Command::SwipeToRefresh {
        is_network_available,
      } => {
        self.get_next_page(PagerFlags::SwipeToRefresh, 1, true, is_network_available, true);
      }
      Command::ItemRendered {
        index,
        is_network_available,
      } => self.on_item_rendered(index, is_network_available),
      Command::PageFromItemNumber { item_number, reply } => {
        let _ = reply.send(self.page_from_item_number(item_number));
      }
      Command::RefreshAllPages { reply } => self.refresh_all_pages(reply),
      Command::CleanAll { config, done } => {
        if let Some(config) = config {
          self.config = config;
        }
        self.states.replace(self.config.state_buffer);
        self.reset().await;
        let _ = done.send(());
      }
      Command::IsAnyPageLoaded { reply } => {
        let _ = reply.send(self.total_pages.is_some_and(|total| total != 0));
      }
      Command::Snapshot { reply } => {
        let _ = reply.send(self.paged_items.clone());
      }
    }
  }

  fn page_from_item_number(&self, item_number: u32) -> u32 {
    page_for_item(item_number, self.config.page_size, self.total_pages)
  }

  fn on_item_rendered(&mut self, index: u32, is_network_available: Option<bool>) {
    // index -> 1-based item number, shifted by the lookahead offset
    let number_from_index = index
      .saturating_add(1)
      .saturating_add(self.config.item_offset_before_next_page);
    let next_item_number = number_from_index.saturating_add(1);
    let next_page_number = self.page_from_item_number(next_item_number);
    let is_next_page_available = self
      .total_pages
      .map_or(true, |total| next_page_number <= total);
    let is_next_page_already_downloaded = self.paged_items.contains_key(&next_page_number);
    let is_allowed_to_download_next_page =
      !is_next_page_already_downloaded && is_next_page_available;

    self.log(|| {
      format!(
        "item rendered: number_from_index {number_from_index}, next_item_number {next_item_number}, \
         next_page_number {next_page_number}, is_next_page_available {is_next_page_available}, \
         is_next_page_already_downloaded {is_next_page_already_downloaded}"
      )
    });

    self.get_next_page(
      PagerFlags::Paging,
      next_page_number,
      false,
      is_network_available,
      is_allowed_to_download_next_page,
    );
  }

  /// Start fetching `page_number` unless a fetch is already in flight.
  ///
  /// With `reset_before_success`, held pages are dropped only once the fetch
  /// succeeds, so a failed refresh keeps the old data.
  fn get_next_page(
    &mut self,
    flag: PagerFlags,
    page_number: u32,
    reset_before_success: bool,
    is_network_available: Option<bool>,
    is_allowed_to_download_next_page: bool,
  ) {
    if self.page_fetching_job.is_some() {
      self.log(|| format!("previous page fetch is not completed, dropping {flag:?} for page {page_number}"));
      return;
    }

    if !is_allowed_to_download_next_page {
      self.log(|| "not allowed to download more pages".to_string());
      self.emit(PagerStates::NoMorePagesAvailable {
        current_items: self.paged_items.clone(),
      });
      return;
    }

    if is_network_available == Some(false) {
      self.log(|| "no connection, skipping page fetch".to_string());
      self.emit(PagerStates::Error {
        error: CrutchError::NoConnection.into(),
        flag,
        current_items: self.paged_items.clone(),
      });
      return;
    }

    self.emit(PagerStates::Loading {
      page_number,
      flag,
      current_items: self.paged_items.clone(),
    });

    let source = Arc::clone(&self.source);
    let completion_tx = self.completion_tx.clone();
    let generation = self.generation;
    self.page_fetching_job = Some(tokio::spawn(async move {
      let result = fetch_page(source.as_ref(), page_number).await;
      let _ = completion_tx.send(Completion::Page {
        generation,
        page_number,
        flag,
        reset_before_success,
        result,
      });
    }));
  }

  /// Re-fetch every held page on a worker task. A refresh still running is
  /// superseded.
  fn refresh_all_pages(&mut self, reply: oneshot::Sender<Result<(), CrutchError>>) {
    self.supersede_refresh();

    let pages: Vec<u32> = self.paged_items.keys().copied().collect();
    self.log(|| format!("refreshing all pages {pages:?}"));

    let id = self.next_refresh_id;
    self.next_refresh_id += 1;
    let source = Arc::clone(&self.source);
    let completion_tx = self.completion_tx.clone();
    let handle = tokio::spawn(async move {
      let mut refreshed = Vec::with_capacity(pages.len());
      let mut failure = None;
      for page_number in pages {
        match fetch_page(source.as_ref(), page_number).await {
          Ok(data) => refreshed.push((page_number, data)),
          Err(error) => {
            failure = Some(error);
            break;
          }
        }
      }
      let result = match failure {
        Some(error) => Err(error),
        None => Ok(refreshed),
      };
      let _ = completion_tx.send(Completion::Refresh { id, result });
    });

    self.refresh_job = Some(RefreshJob {
      id,
      epoch: self.data_epoch,
      handle,
      reply,
    });
  }

  /// Abort the running refresh, if any, telling its caller it was superseded.
  fn supersede_refresh(&mut self) {
    if let Some(refresh) = self.refresh_job.take() {
      refresh.handle.abort();
      self.log(|| format!("refresh {} superseded", refresh.id));
      let _ = refresh.reply.send(Err(CrutchError::RefreshSuperseded));
    }
  }

  fn handle_completion(&mut self, completion: Completion<I>) {
    match completion {
      Completion::Page {
        generation,
        page_number,
        flag,
        reset_before_success,
        result,
      } => {
        if generation != self.generation {
          self.log(|| format!("discarding page {page_number} fetched before reset"));
          return;
        }
        self.page_fetching_job = None;

        match result {
          Ok(data) => {
            if reset_before_success {
              self.clear_data();
            }
            self.apply_page(page_number, data);
            self.data_epoch += 1;
            self.actual_page = page_number;
            self.log(|| format!("page {page_number} fetched for {flag:?}"));
            self.emit(PagerStates::Success {
              flag,
              current_items: self.paged_items.clone(),
            });
          }
          Err(error) => {
            self.logger.warn(
              LOG_TAG,
              || format!("fetching page {page_number} for {flag:?} failed"),
              Some(&error),
            );
            self.emit(PagerStates::Error {
              error,
              flag,
              current_items: self.paged_items.clone(),
            });
          }
        }
      }
      Completion::Refresh { id, result } => {
        let refresh = match self.refresh_job.take() {
          Some(refresh) if refresh.id == id => refresh,
          other => {
            // Aborted after it had already finished
            self.refresh_job = other;
            return;
          }
        };

        if refresh.epoch != self.data_epoch {
          self.log(|| format!("discarding refresh {id}, pages changed since it started"));
          let _ = refresh.reply.send(Err(CrutchError::RefreshSuperseded));
          return;
        }
        let reply = refresh.reply;

        match result {
          Ok(pages) => {
            for (page_number, data) in pages {
              if self.paged_items.contains_key(&page_number) {
                self.apply_page(page_number, data);
              }
            }
            self.log(|| "emitting after refresh".to_string());
            self.emit(PagerStates::Success {
              flag: PagerFlags::RefreshingAllPages,
              current_items: self.paged_items.clone(),
            });
            let _ = reply.send(Ok(()));
          }
          Err(error) => {
            self.emit(PagerStates::Error {
              error: error.clone(),
              flag: PagerFlags::RefreshingAllPages,
              current_items: self.paged_items.clone(),
            });
            let _ = reply.send(Err(CrutchError::Failed(error)));
          }
        }
      }
    }
  }

  /// Store a fetched page; its reported total wins over earlier ones.
  fn apply_page(&mut self, page_number: u32, data: PagingItemsData<I>) {
    self.total_pages = Some(page_for_item(
      data.total_items_number,
      self.config.page_size,
      None,
    ));
    self.total_items_count = data.total_items_number;
    self.paged_items.insert(page_number, data);
  }

  /// Cancel the in-flight fetch and any refresh, wait for the fetch, and
  /// clear everything.
  async fn reset(&mut self) {
    self.log(|| "resetting pager".to_string());
    self.supersede_refresh();
    if let Some(job) = self.page_fetching_job.take() {
      job.abort();
      let _ = job.await;
    }
    self.generation += 1;
    self.clear_data();
  }

  fn clear_data(&mut self) {
    self.actual_page = 1;
    self.total_pages = None;
    self.total_items_count = 1;
    self.paged_items.clear();
    self.data_epoch += 1;
    self.log(|| "cleared pager data".to_string());
  }

  fn emit(&self, state: PagerStates<I>) {
    self.log(|| format!("state: {state}"));
    self.states.emit(state);
  }

  /// Log with the pager counters appended.
  fn log(&self, message: impl FnOnce() -> String) {
    self.logger.debug(LOG_TAG, || {
      format!(
        "{} (actual_page: {}, total_pages: {:?}, total_items_count: {}, page_size: {}, item_offset_before_next_page: {})",
        message(),
        self.actual_page,
        self.total_pages,
        self.total_items_count,
        self.config.page_size,
        self.config.item_offset_before_next_page
      )
    });
  }
}

/// Fetch one page, turning a panicking source into an error.
async fn fetch_page<I, S>(source: &S, page_number: u32) -> Result<PagingItemsData<I>, SharedError>
where
  S: PageSource<I> + ?Sized,
{
  match AssertUnwindSafe(source.get_page(page_number)).catch_unwind().await {
    Ok(result) => result.map_err(SharedError::from),
    Err(_) => Err(eyre!("page source panicked while fetching page {}", page_number).into()),
  }
}
