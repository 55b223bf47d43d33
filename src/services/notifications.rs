use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
  Danger,
  Warning,
  Info,
}

/// Transient message for the user, shown outside the images list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub kind: NotificationKind,
  pub error: String,
  pub detail: String,
}

pub trait NotificationSink: Send + Sync {
  fn add_notification(&self, notification: Notification);
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
  fn add_notification(&self, notification: Notification) {
    if self.send(notification).is_err() {
      tracing::debug!("notification dropped, receiver closed");
    }
  }
}
