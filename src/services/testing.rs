//! Scripted gateway and sink shared by service tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Semaphore;

use crate::docker::{GatewayError, ImageGateway, ImageInfo, Scope, UsageMap};

use super::{Notification, NotificationSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
  Pull { reference: String, scope: Scope },
  Remove { id: String, scope: Scope, force: bool },
}

/// Plays back queued results; unscripted calls succeed.
#[derive(Default)]
pub struct FakeGateway {
  pull_results: Mutex<VecDeque<Result<(), GatewayError>>>,
  remove_results: Mutex<VecDeque<Result<(), GatewayError>>>,
  calls: Mutex<Vec<GatewayCall>>,
  /// When set, each pull waits for one permit before completing.
  pull_gate: Option<Semaphore>,
}

impl FakeGateway {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn gated() -> Self {
    Self {
      pull_gate: Some(Semaphore::new(0)),
      ..Self::default()
    }
  }

  pub fn release_pull(&self) {
    if let Some(gate) = &self.pull_gate {
      gate.add_permits(1);
    }
  }

  pub fn push_pull_result(&self, result: Result<(), GatewayError>) {
    self.pull_results.lock().push_back(result);
  }

  pub fn push_remove_result(&self, result: Result<(), GatewayError>) {
    self.remove_results.lock().push_back(result);
  }

  pub fn calls(&self) -> Vec<GatewayCall> {
    self.calls.lock().clone()
  }
}

#[async_trait]
impl ImageGateway for FakeGateway {
  async fn pull_image(&self, reference: &str, scope: Scope) -> Result<(), GatewayError> {
    self.calls.lock().push(GatewayCall::Pull {
      reference: reference.to_string(),
      scope,
    });
    let result = self.pull_results.lock().pop_front().unwrap_or(Ok(()));
    if let Some(gate) = &self.pull_gate {
      gate.acquire().await.expect("gate closed").forget();
    }
    result
  }

  async fn remove_image(&self, id: &str, scope: Scope, force: bool) -> Result<(), GatewayError> {
    self.calls.lock().push(GatewayCall::Remove {
      id: id.to_string(),
      scope,
      force,
    });
    self.remove_results.lock().pop_front().unwrap_or(Ok(()))
  }

  async fn list_images(&self, _scope: Scope) -> Result<Vec<ImageInfo>, GatewayError> {
    Ok(Vec::new())
  }

  async fn image_usage(&self, _scope: Scope, _all: bool) -> Result<UsageMap, GatewayError> {
    Ok(UsageMap::new())
  }

  fn is_available(&self, _scope: Scope) -> bool {
    true
  }
}

#[derive(Default)]
pub struct RecordingSink {
  notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
  pub fn notifications(&self) -> Vec<Notification> {
    self.notifications.lock().clone()
  }
}

impl NotificationSink for RecordingSink {
  fn add_notification(&self, notification: Notification) {
    self.notifications.lock().push(notification);
  }
}
