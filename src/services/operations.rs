//! Image operations: pull, remove and the remove → force-remove escalation.
//!
//! Every operation applies its store transition before calling the gateway
//! and reconciles the store when the call returns. The store lock is never
//! held across a gateway call.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::docker::{GatewayError, ImageGateway, ImageInfo, Scope};
use crate::state::{DeleteEvent, DeleteTarget, ImagesEvent, ImagesStore, RemoveCommand};

use super::{Notification, NotificationKind, NotificationSink};

/// Coordinates image operations against the engine gateway.
#[derive(Clone)]
pub struct ImageOperations {
  store: Arc<ImagesStore>,
  gateway: Arc<dyn ImageGateway>,
  notifications: Arc<dyn NotificationSink>,
}

impl ImageOperations {
  pub fn new(
    store: Arc<ImagesStore>,
    gateway: Arc<dyn ImageGateway>,
    notifications: Arc<dyn NotificationSink>,
  ) -> Self {
    Self {
      store,
      gateway,
      notifications,
    }
  }

  pub fn store(&self) -> &Arc<ImagesStore> {
    &self.store
  }

  pub fn gateway(&self) -> &Arc<dyn ImageGateway> {
    &self.gateway
  }

  /// Pull `name` (optionally `name:tag`) into `scope`.
  ///
  /// The in-progress slot shows `name` while the pull runs and is cleared
  /// when it finishes either way. Failures are also reported to the
  /// notification sink.
  pub async fn pull(&self, name: &str, tag: Option<&str>, scope: Scope) -> Result<(), GatewayError> {
    let tag = tag.filter(|t| !t.is_empty());
    let reference = match tag {
      Some(tag) => format!("{name}:{tag}"),
      None => name.to_string(),
    };

    self.store.dispatch(ImagesEvent::PullStarted { name: name.to_string() });
    let result = self.gateway.pull_image(&reference, scope).await;
    self.store.dispatch(ImagesEvent::PullFinished);

    match &result {
      Ok(()) => info!(%reference, %scope, "image pulled"),
      Err(e) => {
        // The message names "latest" when no tag was given, matching what
        // the engine resolves an untagged pull to.
        self.notifications.add_notification(Notification {
          kind: NotificationKind::Danger,
          error: format!("Failed to download image {}:{}", name, tag.unwrap_or("latest")),
          detail: format!("Error message: {}", e.detail()),
        });
      }
    }
    result
  }

  /// Issue a removal and reconcile the delete flow with its outcome.
  ///
  /// A failed plain removal moves the flow to the remove-error state with the
  /// engine's reason. A forced removal always finishes the flow; its failure
  /// is only logged and never reaches the user. Outcomes of requests the flow
  /// is no longer waiting on are dropped by the store.
  pub async fn remove(&self, command: &RemoveCommand) -> Result<(), GatewayError> {
    let RemoveCommand { target, force, request } = command;
    let request = *request;
    let id = &target.key.id;
    let result = self.gateway.remove_image(id, target.scope(), *force).await;

    if *force {
      match &result {
        Ok(()) => info!(image = %id, request, "image force-removed"),
        Err(e) => error!(image = %id, request, error = ?e, "Failed to do RemoveImageForce call"),
      }
      self.store.dispatch(ImagesEvent::Delete(DeleteEvent::ForceRemoveFinished { request }));
    } else {
      match &result {
        Ok(()) => {
          info!(image = %id, request, "image removed");
          self.store.dispatch(ImagesEvent::Delete(DeleteEvent::RemoveSucceeded { request }));
        }
        Err(e) => {
          self.store.dispatch(ImagesEvent::Delete(DeleteEvent::RemoveFailed {
            request,
            reason: e.reason_text(),
          }));
        }
      }
    }
    result
  }

  /// Open the delete confirmation for `image`.
  pub fn request_delete(&self, image: &ImageInfo) {
    self
      .store
      .dispatch(ImagesEvent::Delete(DeleteEvent::Requested(DeleteTarget::from(image))));
  }

  pub fn cancel_delete(&self) {
    self.store.dispatch(ImagesEvent::Delete(DeleteEvent::Cancelled));
  }

  /// Confirm the pending deletion. `None` when no confirmation was open.
  pub async fn confirm_remove(&self) -> Option<Result<(), GatewayError>> {
    let command = self.store.dispatch(ImagesEvent::Delete(DeleteEvent::Confirmed))?;
    Some(self.remove(&command).await)
  }

  pub fn cancel_remove_error(&self) {
    self.store.dispatch(ImagesEvent::Delete(DeleteEvent::Cancelled));
  }

  /// Escalate a failed removal. `None` when no remove error was showing.
  pub async fn force_remove(&self) -> Option<Result<(), GatewayError>> {
    let command = self.store.dispatch(ImagesEvent::Delete(DeleteEvent::ForceRequested))?;
    Some(self.remove(&command).await)
  }

  pub fn spawn_pull(&self, name: String, tag: Option<String>, scope: Scope) -> JoinHandle<()> {
    let ops = self.clone();
    tokio::spawn(async move {
      let _ = ops.pull(&name, tag.as_deref(), scope).await;
    })
  }

  pub fn spawn_confirm_remove(&self) -> JoinHandle<()> {
    let ops = self.clone();
    tokio::spawn(async move {
      let _ = ops.confirm_remove().await;
    })
  }

  pub fn spawn_force_remove(&self) -> JoinHandle<()> {
    let ops = self.clone();
    tokio::spawn(async move {
      let _ = ops.force_remove().await;
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::docker::{GatewayError, ImageKey, IMAGE_IN_USE, IMAGE_NOT_FOUND};
  use crate::services::testing::{FakeGateway, GatewayCall, RecordingSink};
  use crate::state::DeleteFlow;

  struct Harness {
    ops: ImageOperations,
    gateway: Arc<FakeGateway>,
    sink: Arc<RecordingSink>,
  }

  fn harness(gateway: FakeGateway) -> Harness {
    let gateway = Arc::new(gateway);
    let sink = Arc::new(RecordingSink::default());
    let ops = ImageOperations::new(Arc::new(ImagesStore::new()), gateway.clone(), sink.clone());
    Harness { ops, gateway, sink }
  }

  fn image(id: &str, is_system: bool) -> ImageInfo {
    ImageInfo {
      id: id.to_string(),
      repo_tags: vec![format!("{id}:latest")],
      created: None,
      size: 0,
      is_system,
    }
  }

  #[tokio::test]
  async fn test_pull_success_clears_slot_without_notification() {
    let h = harness(FakeGateway::new());
    let mut rx = h.ops.store().subscribe();

    h.ops.pull("busybox", Some("latest"), Scope::System).await.unwrap();

    assert!(h.ops.store().snapshot().download_in_progress.is_none());
    assert!(h.sink.notifications().is_empty());
    assert_eq!(
      h.gateway.calls(),
      vec![GatewayCall::Pull {
        reference: "busybox:latest".to_string(),
        scope: Scope::System
      }]
    );
    // Slot went busybox -> empty.
    assert_eq!(rx.try_recv().unwrap(), crate::state::ImagesChanged::Download);
    assert_eq!(rx.try_recv().unwrap(), crate::state::ImagesChanged::Download);
  }

  #[tokio::test]
  async fn test_pull_shows_name_while_in_flight() {
    let h = harness(FakeGateway::gated());
    let handle = h.ops.spawn_pull("busybox".to_string(), Some("1.36".to_string()), Scope::User);

    tokio::task::yield_now().await;
    while h.gateway.calls().is_empty() {
      tokio::task::yield_now().await;
    }
    assert_eq!(h.ops.store().snapshot().download_in_progress.as_deref(), Some("busybox"));

    h.gateway.release_pull();
    handle.await.unwrap();
    assert!(h.ops.store().snapshot().download_in_progress.is_none());
  }

  #[tokio::test]
  async fn test_pull_failure_notifies_with_latest_tag() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_pull_result(Err(GatewayError::new(IMAGE_NOT_FOUND, "not found")));

    let err = h.ops.pull("busybox", None, Scope::User).await.unwrap_err();
    assert_eq!(err.code, IMAGE_NOT_FOUND);

    assert!(h.ops.store().snapshot().download_in_progress.is_none());
    assert_eq!(
      h.gateway.calls(),
      vec![GatewayCall::Pull {
        reference: "busybox".to_string(),
        scope: Scope::User
      }]
    );
    let notifications = h.sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Danger);
    assert!(notifications[0].error.contains("busybox:latest"));
    assert!(notifications[0].detail.contains("not found"));
  }

  #[tokio::test]
  async fn test_second_pull_overwrites_slot_and_first_completion_clears_it() {
    let h = harness(FakeGateway::gated());
    let first = h.ops.spawn_pull("alpine".to_string(), None, Scope::System);
    while h.gateway.calls().is_empty() {
      tokio::task::yield_now().await;
    }
    let second = h.ops.spawn_pull("busybox".to_string(), None, Scope::System);
    while h.gateway.calls().len() < 2 {
      tokio::task::yield_now().await;
    }
    assert_eq!(h.ops.store().snapshot().download_in_progress.as_deref(), Some("busybox"));

    h.gateway.release_pull();
    // One of the two pulls finished; the shared slot is empty even though the
    // other one is still running.
    while h.ops.store().snapshot().download_in_progress.is_some() {
      tokio::task::yield_now().await;
    }
    h.gateway.release_pull();
    first.await.unwrap();
    second.await.unwrap();
    assert!(h.ops.store().snapshot().download_in_progress.is_none());
  }

  #[tokio::test]
  async fn test_confirm_remove_success_returns_to_idle() {
    let h = harness(FakeGateway::new());
    h.ops.request_delete(&image("img1", true));

    let result = h.ops.confirm_remove().await;
    assert_eq!(result, Some(Ok(())));
    assert!(h.ops.store().snapshot().delete_flow.is_idle());
    assert_eq!(
      h.gateway.calls(),
      vec![GatewayCall::Remove {
        id: "img1".to_string(),
        scope: Scope::System,
        force: false
      }]
    );
  }

  #[tokio::test]
  async fn test_failed_remove_enters_remove_error_with_reason() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.ops.request_delete(&image("img1", true));

    let result = h.ops.confirm_remove().await.unwrap();
    assert!(result.is_err());

    let state = h.ops.store().snapshot();
    let (target, reason) = state.delete_flow.remove_error().unwrap();
    assert_eq!(target.key, ImageKey::new("img1", true));
    assert_eq!(reason, "image in use");
  }

  #[tokio::test]
  async fn test_force_remove_closes_dialog_on_success() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.ops.request_delete(&image("img1", false));
    h.ops.confirm_remove().await;

    assert_eq!(h.ops.force_remove().await, Some(Ok(())));
    assert!(h.ops.store().snapshot().delete_flow.is_idle());
    assert_eq!(
      h.gateway.calls().last(),
      Some(&GatewayCall::Remove {
        id: "img1".to_string(),
        scope: Scope::User,
        force: true
      })
    );
  }

  #[tokio::test]
  async fn test_force_remove_failure_is_swallowed_and_closes_dialog() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "still in use")));
    h.ops.request_delete(&image("img1", true));
    h.ops.confirm_remove().await;

    let result = h.ops.force_remove().await.unwrap();
    assert!(result.is_err());
    assert!(h.ops.store().snapshot().delete_flow.is_idle());
    assert!(h.sink.notifications().is_empty());
  }

  #[tokio::test]
  async fn test_spawned_remove_and_force_complete_flow() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.ops.request_delete(&image("img1", true));

    h.ops.spawn_confirm_remove().await.unwrap();
    assert!(h.ops.store().snapshot().delete_flow.remove_error().is_some());

    h.ops.spawn_force_remove().await.unwrap();
    assert!(h.ops.store().snapshot().delete_flow.is_idle());
    assert_eq!(h.gateway.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_cancel_remove_error_clears_everything() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.ops.request_delete(&image("img1", true));
    h.ops.confirm_remove().await;

    h.ops.cancel_remove_error();
    assert_eq!(h.ops.store().snapshot().delete_flow, DeleteFlow::Idle);
    assert!(h.ops.force_remove().await.is_none());
  }

  #[tokio::test]
  async fn test_confirm_without_pending_delete_does_nothing() {
    let h = harness(FakeGateway::new());
    assert!(h.ops.confirm_remove().await.is_none());
    h.ops.request_delete(&image("img1", true));
    h.ops.cancel_delete();
    assert!(h.ops.confirm_remove().await.is_none());
    assert!(h.gateway.calls().is_empty());
  }

  #[tokio::test]
  async fn test_stale_failure_does_not_hijack_new_delete() {
    let h = harness(FakeGateway::new());
    h.ops.request_delete(&image("a", true));
    // Removal of "a" is issued but has not returned yet.
    let stale = h
      .ops
      .store()
      .dispatch(ImagesEvent::Delete(DeleteEvent::Confirmed))
      .unwrap();

    h.ops.request_delete(&image("b", true));
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    let _ = h.ops.remove(&stale).await;

    let state = h.ops.store().snapshot();
    assert!(state.delete_flow.remove_error().is_none());
    assert_eq!(state.delete_flow.confirming().map(|t| t.key.id.as_str()), Some("b"));
  }

  #[tokio::test]
  async fn test_late_force_completion_keeps_newer_remove_error() {
    let h = harness(FakeGateway::new());
    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "image in use")));
    h.ops.request_delete(&image("a", true));
    h.ops.confirm_remove().await;

    // Force removal is issued, then the dialog is dismissed before it returns.
    let force = h
      .ops
      .store()
      .dispatch(ImagesEvent::Delete(DeleteEvent::ForceRequested))
      .unwrap();
    h.ops.cancel_remove_error();

    h.gateway
      .push_remove_result(Err(GatewayError::new(IMAGE_IN_USE, "still in use")));
    h.ops.request_delete(&image("a", true));
    h.ops.confirm_remove().await;

    assert_eq!(h.ops.remove(&force).await, Ok(()));
    let state = h.ops.store().snapshot();
    let (target, reason) = state.delete_flow.remove_error().unwrap();
    assert_eq!(target.key, ImageKey::new("a", true));
    assert_eq!(reason, "still in use");
  }

  #[tokio::test]
  async fn test_delete_and_pull_do_not_interfere() {
    let h = harness(FakeGateway::gated());
    h.ops.request_delete(&image("img1", true));
    let pull = h.ops.spawn_pull("busybox".to_string(), None, Scope::System);
    while h.gateway.calls().is_empty() {
      tokio::task::yield_now().await;
    }

    h.ops.confirm_remove().await;
    let state = h.ops.store().snapshot();
    assert!(state.delete_flow.is_idle());
    assert_eq!(state.download_in_progress.as_deref(), Some("busybox"));

    h.gateway.release_pull();
    pull.await.unwrap();
    assert!(h.ops.store().snapshot().download_in_progress.is_none());
  }
}
