//! Delete flow state machine.
//!
//! ```text
//!   Idle ──request──▶ ConfirmPending ──confirm──▶ Removing ──ok──▶ Idle
//!    ▲                     │cancel                   │failed
//!    └─────────────────────┘                         ▼
//!    ▲                                          RemoveError ──force──▶ ForceRemoving
//!    └──────────── cancel / force finished ─────────┴────────────────────┘
//! ```
//!
//! A new delete request replaces whatever flow is in progress. Every issued
//! removal gets a fresh [`RequestId`]; completions echo it and are dropped
//! unless the flow is still waiting on that exact request.

use serde::{Deserialize, Serialize};

use crate::docker::{ImageInfo, ImageKey, Scope};

/// Sequence number of an issued removal.
pub type RequestId = u64;

/// The image a delete flow is acting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTarget {
  pub key: ImageKey,
  pub name: String,
}

impl DeleteTarget {
  pub fn scope(&self) -> Scope {
    Scope::from_is_system(self.key.is_system)
  }
}

impl From<&ImageInfo> for DeleteTarget {
  fn from(image: &ImageInfo) -> Self {
    Self {
      key: image.key(),
      name: image.display_name(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeleteFlow {
  #[default]
  Idle,
  ConfirmPending {
    target: DeleteTarget,
  },
  Removing {
    target: DeleteTarget,
    request: RequestId,
  },
  RemoveError {
    target: DeleteTarget,
    reason: String,
  },
  ForceRemoving {
    target: DeleteTarget,
    reason: String,
    request: RequestId,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteEvent {
  Requested(DeleteTarget),
  Cancelled,
  Confirmed,
  RemoveSucceeded { request: RequestId },
  RemoveFailed { request: RequestId, reason: String },
  ForceRequested,
  ForceRemoveFinished { request: RequestId },
}

/// A gateway call the caller must issue after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveCommand {
  pub target: DeleteTarget,
  pub force: bool,
  pub request: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
  pub next: DeleteFlow,
  pub command: Option<RemoveCommand>,
}

impl Transition {
  fn to(next: DeleteFlow) -> Self {
    Self { next, command: None }
  }

  fn issuing(next: DeleteFlow, target: DeleteTarget, force: bool, request: RequestId) -> Self {
    Self {
      next,
      command: Some(RemoveCommand { target, force, request }),
    }
  }
}

impl DeleteFlow {
  pub fn target(&self) -> Option<&DeleteTarget> {
    match self {
      DeleteFlow::Idle => None,
      DeleteFlow::ConfirmPending { target }
      | DeleteFlow::Removing { target, .. }
      | DeleteFlow::RemoveError { target, .. }
      | DeleteFlow::ForceRemoving { target, .. } => Some(target),
    }
  }

  pub fn is_idle(&self) -> bool {
    matches!(self, DeleteFlow::Idle)
  }

  /// Target of the open delete confirmation dialog.
  pub fn confirming(&self) -> Option<&DeleteTarget> {
    match self {
      DeleteFlow::ConfirmPending { target } => Some(target),
      _ => None,
    }
  }

  /// Target and reason of the open remove-error dialog. The dialog stays up
  /// while a force removal is running.
  pub fn remove_error(&self) -> Option<(&DeleteTarget, &str)> {
    match self {
      DeleteFlow::RemoveError { target, reason } | DeleteFlow::ForceRemoving { target, reason, .. } => {
        Some((target, reason.as_str()))
      }
      _ => None,
    }
  }

  /// Removal the flow is waiting on.
  pub fn pending_request(&self) -> Option<RequestId> {
    match self {
      DeleteFlow::Removing { request, .. } | DeleteFlow::ForceRemoving { request, .. } => Some(*request),
      _ => None,
    }
  }

  /// Next state for `event`. A command issued by this transition is tagged
  /// with `next_request`. Events that do not apply leave the state as is.
  pub fn transition(&self, event: &DeleteEvent, next_request: RequestId) -> Transition {
    match (self, event) {
      (_, DeleteEvent::Requested(target)) => Transition::to(DeleteFlow::ConfirmPending {
        target: target.clone(),
      }),

      (DeleteFlow::ConfirmPending { .. } | DeleteFlow::RemoveError { .. } | DeleteFlow::ForceRemoving { .. },
        DeleteEvent::Cancelled) => Transition::to(DeleteFlow::Idle),

      (DeleteFlow::ConfirmPending { target }, DeleteEvent::Confirmed) => Transition::issuing(
        DeleteFlow::Removing {
          target: target.clone(),
          request: next_request,
        },
        target.clone(),
        false,
        next_request,
      ),

      (DeleteFlow::Removing { request: pending, .. }, DeleteEvent::RemoveSucceeded { request })
        if pending == request =>
      {
        Transition::to(DeleteFlow::Idle)
      }

      (DeleteFlow::Removing { target, request: pending }, DeleteEvent::RemoveFailed { request, reason })
        if pending == request =>
      {
        Transition::to(DeleteFlow::RemoveError {
          target: target.clone(),
          reason: reason.clone(),
        })
      }

      (DeleteFlow::RemoveError { target, reason }, DeleteEvent::ForceRequested) => Transition::issuing(
        DeleteFlow::ForceRemoving {
          target: target.clone(),
          reason: reason.clone(),
          request: next_request,
        },
        target.clone(),
        true,
        next_request,
      ),

      (DeleteFlow::ForceRemoving { request: pending, .. }, DeleteEvent::ForceRemoveFinished { request })
        if pending == request =>
      {
        Transition::to(DeleteFlow::Idle)
      }

      _ => Transition::to(self.clone()),
    }
  }
}
