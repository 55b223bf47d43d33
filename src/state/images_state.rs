use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::docker::ImageInfo;

use super::delete_flow::{DeleteEvent, DeleteFlow, RemoveCommand, RequestId};
use super::vulnerability::VulnerabilityMap;

/// Event emitted after the images view model changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImagesChanged {
  DeleteFlow,
  Download,
  Modals,
  ExpandedRow,
  Vulnerabilities,
}

#[derive(Clone, Debug)]
pub enum ImagesEvent {
  Delete(DeleteEvent),
  PullStarted { name: String },
  PullFinished,
  VulnerabilitiesReplaced(VulnerabilityMap),
  RunImageOpened(ImageInfo),
  RunImageClosed,
  SearchOpened,
  SearchClosed,
  /// Expand a row by its row id, or collapse it when already expanded
  RowToggled(String),
}

/// View model for the images list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImagesState {
  pub delete_flow: DeleteFlow,
  /// Name of the image being pulled. One slot: a newer pull replaces the
  /// name, and whichever pull finishes first clears it.
  pub download_in_progress: Option<String>,
  pub run_image: Option<ImageInfo>,
  pub search_open: bool,
  pub expanded_row: Option<String>,
  pub vulnerabilities: VulnerabilityMap,
  /// Last request id handed to an issued removal
  last_request: RequestId,
}

impl ImagesState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Apply one event. Returns the removal the caller must issue, if any, and
  /// which slice changed (`None` when the event was a no-op).
  pub fn apply(&mut self, event: ImagesEvent) -> (Option<RemoveCommand>, Option<ImagesChanged>) {
    match event {
      ImagesEvent::Delete(event) => {
        let transition = self.delete_flow.transition(&event, self.last_request + 1);
        if let Some(command) = &transition.command {
          self.last_request = command.request;
        }
        if transition.next == self.delete_flow {
          tracing::debug!(?event, "delete event ignored in current state");
          return (transition.command, None);
        }
        self.delete_flow = transition.next;
        (transition.command, Some(ImagesChanged::DeleteFlow))
      }
      ImagesEvent::PullStarted { name } => {
        self.download_in_progress = Some(name);
        (None, Some(ImagesChanged::Download))
      }
      ImagesEvent::PullFinished => {
        let changed = self.download_in_progress.take().map(|_| ImagesChanged::Download);
        (None, changed)
      }
      ImagesEvent::VulnerabilitiesReplaced(map) => {
        self.vulnerabilities = map;
        (None, Some(ImagesChanged::Vulnerabilities))
      }
      ImagesEvent::RunImageOpened(image) => {
        self.run_image = Some(image);
        (None, Some(ImagesChanged::Modals))
      }
      ImagesEvent::RunImageClosed => {
        let changed = self.run_image.take().map(|_| ImagesChanged::Modals);
        (None, changed)
      }
      ImagesEvent::SearchOpened => {
        self.search_open = true;
        (None, Some(ImagesChanged::Modals))
      }
      ImagesEvent::SearchClosed => {
        let was_open = std::mem::replace(&mut self.search_open, false);
        (None, was_open.then_some(ImagesChanged::Modals))
      }
      ImagesEvent::RowToggled(row_id) => {
        if self.expanded_row.as_deref() == Some(row_id.as_str()) {
          self.expanded_row = None;
        } else {
          self.expanded_row = Some(row_id);
        }
        (None, Some(ImagesChanged::ExpandedRow))
      }
    }
  }
}

/// Shared owner of [`ImagesState`]. Views read snapshots and subscribe to
/// [`ImagesChanged`]; operations and the vulnerability listener dispatch events.
pub struct ImagesStore {
  state: Mutex<ImagesState>,
  events: broadcast::Sender<ImagesChanged>,
}

impl ImagesStore {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      state: Mutex::new(ImagesState::new()),
      events,
    }
  }

  pub fn snapshot(&self) -> ImagesState {
    self.state.lock().clone()
  }

  pub fn read<R>(&self, f: impl FnOnce(&ImagesState) -> R) -> R {
    f(&self.state.lock())
  }

  pub fn dispatch(&self, event: ImagesEvent) -> Option<RemoveCommand> {
    let (command, changed) = self.state.lock().apply(event);
    if let Some(changed) = changed {
      // No subscribers is fine
      let _ = self.events.send(changed);
    }
    command
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ImagesChanged> {
    self.events.subscribe()
  }
}

impl Default for ImagesStore {
  fn default() -> Self {
    Self::new()
  }
}
