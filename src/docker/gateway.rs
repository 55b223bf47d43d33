//! Engine gateway: the seam between image operations and the engine API.
//!
//! Podman runs one service for the whole system and one per logged-in user.
//! Every call names the [`Scope`] it targets; [`PodmanGateway`] routes it to
//! the matching socket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DockerClient, GatewayError, ImageInfo, UsageMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
  System,
  User,
}

impl Scope {
  pub fn from_is_system(is_system: bool) -> Self {
    if is_system { Scope::System } else { Scope::User }
  }

  pub fn is_system(self) -> bool {
    matches!(self, Scope::System)
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::System => write!(f, "system"),
      Scope::User => write!(f, "user"),
    }
  }
}

#[async_trait]
pub trait ImageGateway: Send + Sync {
  /// Pull `reference` (`name` or `name:tag`) into the given scope.
  async fn pull_image(&self, reference: &str, scope: Scope) -> Result<(), GatewayError>;

  /// Remove an image by id. `force` also removes it from containers using it.
  async fn remove_image(&self, id: &str, scope: Scope, force: bool) -> Result<(), GatewayError>;

  async fn list_images(&self, scope: Scope) -> Result<Vec<ImageInfo>, GatewayError>;

  async fn image_usage(&self, scope: Scope, all: bool) -> Result<UsageMap, GatewayError>;

  fn is_available(&self, scope: Scope) -> bool;
}

/// Gateway backed by the Docker-compatible API of the system and user Podman services.
pub struct PodmanGateway {
  system: Option<DockerClient>,
  user: Option<DockerClient>,
}

impl PodmanGateway {
  /// Connect to both services. A service that cannot be reached is left out
  /// and every call against its scope fails with `ServiceUnavailable`.
  pub async fn connect(system_socket: &str, user_socket: &str, timeout_secs: u64) -> Self {
    Self {
      system: Self::connect_one(Scope::System, system_socket, timeout_secs).await,
      user: Self::connect_one(Scope::User, user_socket, timeout_secs).await,
    }
  }

  async fn connect_one(scope: Scope, socket: &str, timeout_secs: u64) -> Option<DockerClient> {
    let mut client = DockerClient::new(socket, timeout_secs);
    match client.connect().await {
      Ok(()) => {
        tracing::debug!(%scope, socket, "connected to engine");
        Some(client)
      }
      Err(e) => {
        tracing::warn!(%scope, "{}", e);
        None
      }
    }
  }

  fn client(&self, scope: Scope) -> Result<&DockerClient, GatewayError> {
    let client = match scope {
      Scope::System => self.system.as_ref(),
      Scope::User => self.user.as_ref(),
    };
    client.ok_or_else(|| GatewayError::unavailable(scope))
  }
}

#[async_trait]
impl ImageGateway for PodmanGateway {
  async fn pull_image(&self, reference: &str, scope: Scope) -> Result<(), GatewayError> {
    self.client(scope)?.pull_image(reference).await
  }

  async fn remove_image(&self, id: &str, scope: Scope, force: bool) -> Result<(), GatewayError> {
    self.client(scope)?.remove_image(id, force).await
  }

  async fn list_images(&self, scope: Scope) -> Result<Vec<ImageInfo>, GatewayError> {
    self.client(scope)?.list_images(scope.is_system()).await
  }

  async fn image_usage(&self, scope: Scope, all: bool) -> Result<UsageMap, GatewayError> {
    self.client(scope)?.list_image_usage(scope.is_system(), all).await
  }

  fn is_available(&self, scope: Scope) -> bool {
    self.client(scope).is_ok()
  }
}
