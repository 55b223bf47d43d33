use anyhow::{anyhow, Result};
use bollard::Docker;
use std::path::Path;

/// Connection to one engine socket (the system service or a user's service).
pub struct DockerClient {
    inner: Option<Docker>,
    socket_path: String,
    timeout_secs: u64,
}

impl DockerClient {
    pub fn new(socket_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            inner: None,
            socket_path: socket_path.into(),
            timeout_secs,
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub async fn connect(&mut self) -> Result<()> {
        if !Path::new(&self.socket_path).exists() {
            return Err(anyhow!(
                "Podman socket not found at {}. Is podman.socket running?",
                self.socket_path
            ));
        }

        let docker = Docker::connect_with_socket(
            &self.socket_path,
            self.timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )?;

        docker.ping().await.map_err(|e| {
            anyhow!(
                "Failed to reach the engine at {}: {}",
                self.socket_path,
                e
            )
        })?;

        self.inner = Some(docker);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    pub fn client(&self) -> Result<&Docker> {
        self.inner
            .as_ref()
            .ok_or_else(|| anyhow!("Not connected to {}", self.socket_path))
    }
}
