use bollard::query_parameters::ListContainersOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DockerClient, GatewayError, ImageKey};

/// A container that references an image, shown in the image's "Used By" tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUsage {
  pub container_id: String,
  pub name: String,
  pub running: bool,
}

/// Containers grouped by the image they were created from.
pub type UsageMap = HashMap<ImageKey, Vec<ImageUsage>>;

impl DockerClient {
  /// Group this engine's containers by image. `all` includes stopped containers.
  pub async fn list_image_usage(&self, is_system: bool, all: bool) -> Result<UsageMap, GatewayError> {
    let docker = self
      .client()
      .map_err(|e| GatewayError::new(super::CONNECTION_ERROR, e.to_string()))?;

    let options = ListContainersOptions {
      all,
      ..Default::default()
    };

    let containers = docker.list_containers(Some(options)).await?;

    let mut usage = UsageMap::new();
    for container in containers {
      let id = container.id.unwrap_or_default();
      let name = container
        .names
        .unwrap_or_default()
        .first()
        .map_or_else(|| id.clone(), |n| n.trim_start_matches('/').to_string());
      let running = container
        .state
        .is_some_and(|s| format!("{s:?}").eq_ignore_ascii_case("running"));

      let Some(image_id) = container.image_id else {
        continue;
      };

      usage
        .entry(ImageKey::new(image_id, is_system))
        .or_default()
        .push(ImageUsage {
          container_id: id,
          name,
          running,
        });
    }

    for containers in usage.values_mut() {
      containers.sort_by(|a, b| a.name.cmp(&b.name));
    }
    Ok(usage)
  }
}
