//! Vulnerability scan results pushed into the images store.
//!
//! Scanners publish complete reports on a [`VulnerabilityFeed`]. A
//! [`VulnerabilitySubscription`] listens for as long as its handle lives and
//! replaces the store's vulnerability map with every report it receives.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::state::{ImagesEvent, ImagesStore, VulnerabilityMap, VulnerabilityReport};

/// Broadcast source for scan reports.
#[derive(Clone)]
pub struct VulnerabilityFeed {
  sender: broadcast::Sender<Arc<VulnerabilityReport>>,
}

impl VulnerabilityFeed {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity);
    Self { sender }
  }

  /// Publish a complete report. Returns how many subscriptions received it.
  pub fn publish(&self, report: VulnerabilityReport) -> usize {
    self.sender.send(Arc::new(report)).unwrap_or(0)
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }
}

impl Default for VulnerabilityFeed {
  fn default() -> Self {
    Self::new(16)
  }
}

/// Registration on a [`VulnerabilityFeed`]. Dropping the handle unregisters.
pub struct VulnerabilitySubscription {
  task: Option<JoinHandle<()>>,
}

impl VulnerabilitySubscription {
  pub fn start(feed: &VulnerabilityFeed, store: Arc<ImagesStore>) -> Self {
    // Subscribe before spawning so no report published after `start` returns is missed.
    let mut receiver = feed.sender.subscribe();
    let task = tokio::spawn(async move {
      loop {
        match receiver.recv().await {
          Ok(report) => {
            let map = VulnerabilityMap::from_report((*report).clone());
            tracing::debug!(images = map.len(), "vulnerability report received");
            store.dispatch(ImagesEvent::VulnerabilitiesReplaced(map));
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            // Reports are full snapshots; the next one supersedes what was skipped.
            tracing::warn!(skipped, "vulnerability subscription lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
      tracing::debug!("vulnerability feed closed");
    });
    Self { task: Some(task) }
  }

  pub fn is_active(&self) -> bool {
    self.task.as_ref().is_some_and(|t| !t.is_finished())
  }

  /// Stop listening and wait for the listener to exit.
  pub async fn shutdown(mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
      let _ = task.await;
    }
  }
}

impl Drop for VulnerabilitySubscription {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}
