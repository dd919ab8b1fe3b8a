//! Hot, replay-latest state channel.
//!
//! A new subscriber first receives the most recent state (if any), then every
//! later state in emission order. Emission never waits for subscribers; a
//! subscriber that falls more than `capacity` states behind skips ahead.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

struct Inner<S> {
  latest: Option<S>,
  sender: broadcast::Sender<S>,
}

pub struct StateChannel<S> {
  inner: Mutex<Inner<S>>,
}

impl<S: Clone + Send + 'static> StateChannel<S> {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self {
      inner: Mutex::new(Inner {
        latest: None,
        sender,
      }),
    }
  }

  // Emission and subscription only swap plain values under the lock, so a
  // poisoned lock still holds consistent data.
  fn lock(&self) -> MutexGuard<'_, Inner<S>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Publish a state to current subscribers and remember it for new ones.
  pub fn emit(&self, state: S) {
    let mut inner = self.lock();
    inner.latest = Some(state.clone());
    // No receivers is fine
    let _ = inner.sender.send(state);
  }

  /// The most recently emitted state.
  pub fn latest(&self) -> Option<S> {
    self.lock().latest.clone()
  }

  /// Subscribe: the latest state first, then every later one.
  pub fn subscribe(&self) -> BoxStream<'static, S> {
    let (latest, receiver) = {
      let inner = self.lock();
      (inner.latest.clone(), inner.sender.subscribe())
    };

    let updates = stream::unfold(receiver, |mut receiver| async move {
      loop {
        match receiver.recv().await {
          Ok(state) => return Some((state, receiver)),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "state subscriber lagged behind");
          }
          Err(broadcast::error::RecvError::Closed) => return None,
        }
      }
    });

    stream::iter(latest).chain(updates).boxed()
  }

  /// Start over with an empty channel.
  ///
  /// Existing subscribers see their stream end; states emitted from now on
  /// reach only new subscribers.
  pub fn replace(&self, capacity: usize) {
    let (sender, _) = broadcast::channel(capacity.max(1));
    let mut inner = self.lock();
    inner.latest = None;
    inner.sender = sender;
  }
}
