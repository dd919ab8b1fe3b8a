use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::actor::{Command, PagerActor};
use super::channel::StateChannel;
use super::types::{PageMap, PagerItemType, PagerStates};
use super::PageSource;
use crate::config::PagerConfig;
use crate::error::{CrutchError, SharedError};
use crate::logging::Logger;

/// Handle to a running pager.
///
/// Clones talk to the same pager task. The task stops once every handle
/// has been dropped.
pub struct Pager<I> {
  commands: mpsc::UnboundedSender<Command<I>>,
  states: Arc<StateChannel<PagerStates<I>>>,
}

impl<I> Clone for Pager<I> {
  fn clone(&self) -> Self {
    Self {
      commands: self.commands.clone(),
      states: Arc::clone(&self.states),
    }
  }
}

impl<I: PagerItemType> Pager<I> {
  /// Start a pager on the current tokio runtime.
  ///
  /// Fails when `config` does not validate. Panics when called outside a
  /// runtime, like `tokio::spawn`.
  pub fn new<S>(source: Arc<S>, config: PagerConfig) -> Result<Self, CrutchError>
  where
    S: PageSource<I> + 'static,
  {
    Self::with_logger(source, config, Logger::default())
  }

  pub fn with_logger<S>(
    source: Arc<S>,
    config: PagerConfig,
    logger: Logger,
  ) -> Result<Self, CrutchError>
  where
    S: PageSource<I> + 'static,
  {
    config
      .validate()
      .map_err(|e| CrutchError::Failed(SharedError::from(e)))?;
    let states = Arc::new(StateChannel::new(config.state_buffer));
    let (commands, receiver) = mpsc::unbounded_channel();
    let actor = PagerActor::new(source, config, Arc::clone(&states), receiver, logger);
    tokio::spawn(actor.run());
    Ok(Self { commands, states })
  }

  /// Stream of pager states: the latest one first, then every transition.
  ///
  /// The stream ends when [`Pager::clean_all`] replaces the state channel.
  pub fn listen_for_paging_states(&self) -> BoxStream<'static, PagerStates<I>> {
    self.states.subscribe()
  }

  /// The most recently published state.
  pub fn latest_state(&self) -> Option<PagerStates<I>> {
    self.states.latest()
  }

  /// Request page 1, optionally dropping everything held first.
  ///
  /// Returns once the request is accepted; the outcome arrives as states.
  pub async fn get_first_page(
    &self,
    is_network_available: Option<bool>,
    reset_before_first_page: bool,
  ) -> Result<(), CrutchError> {
    self
      .request(|done| Command::FirstPage {
        is_network_available,
        reset_before_first_page,
        done,
      })
      .await
  }

  /// Re-fetch page 1; held pages are replaced only if it succeeds.
  pub fn on_swipe_to_refresh(&self, is_network_available: Option<bool>) {
    let _ = self.commands.send(Command::SwipeToRefresh {
      is_network_available,
    });
  }

  /// Report that the item at `index` (0-based) was rendered, fetching the
  /// following page when it is not held yet.
  pub fn on_item_rendered(&self, index: u32, is_network_available: Option<bool>) {
    let _ = self.commands.send(Command::ItemRendered {
      index,
      is_network_available,
    });
  }

  /// Page holding the 1-based `item_number` under the current page size,
  /// clamped to the known page count.
  pub async fn page_from_item_number(&self, item_number: u32) -> Result<u32, CrutchError> {
    self
      .request(|reply| Command::PageFromItemNumber { item_number, reply })
      .await
  }

  /// Re-fetch every held page in order.
  ///
  /// Fails without touching the held pages if any page fails. Returns
  /// [`CrutchError::RefreshSuperseded`] when a reset, a newer refresh or a
  /// page fetch finishing first makes the result stale.
  pub async fn refresh_all_pages(&self) -> Result<(), CrutchError> {
    self.request(|reply| Command::RefreshAllPages { reply }).await?
  }

  /// Cancel any fetch, drop all pages and end every current state stream.
  pub async fn clean_all(&self) -> Result<(), CrutchError> {
    self
      .request(|done| Command::CleanAll { config: None, done })
      .await
  }

  /// Like [`Pager::clean_all`], switching to `config` afterwards.
  pub async fn reconfigure(&self, config: PagerConfig) -> Result<(), CrutchError> {
    config
      .validate()
      .map_err(|e| CrutchError::Failed(SharedError::from(e)))?;
    self
      .request(|done| Command::CleanAll {
        config: Some(config),
        done,
      })
      .await
  }

  /// Whether any fetch has succeeded since the last reset.
  pub async fn is_any_page_loaded(&self) -> Result<bool, CrutchError> {
    self.request(|reply| Command::IsAnyPageLoaded { reply }).await
  }

  /// Pages currently held.
  pub async fn snapshot(&self) -> Result<PageMap<I>, CrutchError> {
    self.request(|reply| Command::Snapshot { reply }).await
  }

  async fn request<T>(
    &self,
    command: impl FnOnce(oneshot::Sender<T>) -> Command<I>,
  ) -> Result<T, CrutchError> {
    let (reply, response) = oneshot::channel();
    self
      .commands
      .send(command(reply))
      .map_err(|_| CrutchError::PagerClosed)?;
    response.await.map_err(|_| CrutchError::PagerClosed)
  }
}
