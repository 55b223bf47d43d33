use serde::{Deserialize, Serialize};

/// Reason code for an image the engine does not know about.
pub const IMAGE_NOT_FOUND: &str = "ImageNotFound";
/// Reason code for an image still referenced by a container.
pub const IMAGE_IN_USE: &str = "ImageInUse";
/// Reason code for a pull that failed mid-stream.
pub const PULL_FAILED: &str = "PullFailed";
/// Reason code for any other server-side failure.
pub const SERVER_ERROR: &str = "ServerError";
/// Reason code for transport failures (socket gone, timeout, bad payload).
pub const CONNECTION_ERROR: &str = "ConnectionError";
/// Reason code for a scope whose engine socket is not connected.
pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";

/// Structured failure reported by the engine gateway.
///
/// `code` is machine-readable; `reason` is whatever human-readable text the
/// engine attached to the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {}", .reason.as_deref().unwrap_or("no reason given"))]
pub struct GatewayError {
  pub code: String,
  pub reason: Option<String>,
}

impl GatewayError {
  pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      code: code.into(),
      reason: Some(reason.into()),
    }
  }

  pub fn unavailable(scope: impl std::fmt::Display) -> Self {
    Self::new(SERVICE_UNAVAILABLE, format!("{scope} service is not available"))
  }

  /// Text shown to the user: the engine's reason, or the code when none was sent.
  pub fn reason_text(&self) -> String {
    self.reason.clone().unwrap_or_else(|| self.code.clone())
  }

  /// `"{code} {reason}"`, the layout used in notification details.
  pub fn detail(&self) -> String {
    format!("{} {}", self.code, self.reason.as_deref().unwrap_or_default())
      .trim_end()
      .to_string()
  }
}

impl From<bollard::errors::Error> for GatewayError {
  fn from(err: bollard::errors::Error) -> Self {
    match err {
      bollard::errors::Error::DockerResponseServerError { status_code, message } => {
        let code = match status_code {
          404 => IMAGE_NOT_FOUND,
          409 => IMAGE_IN_USE,
          _ => SERVER_ERROR,
        };
        Self::new(code, message)
      }
      bollard::errors::Error::DockerStreamError { error } => Self::new(PULL_FAILED, error),
      other => Self::new(CONNECTION_ERROR, other.to_string()),
    }
  }
}
