use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Socket of the system-wide Podman service
pub const DEFAULT_SYSTEM_SOCKET: &str = "/run/podman/podman.sock";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
  /// System service socket path
  pub system_socket: String,
  /// User service socket path (empty for `$XDG_RUNTIME_DIR/podman/podman.sock`)
  pub user_socket: String,
  /// Owner label for user-scoped images (empty for `$USER`)
  pub user_label: String,
  /// Include stopped containers in the "Used By" tab
  pub show_all_containers: bool,
  /// Default tracing filter when `RUST_LOG` is not set
  pub log_filter: String,
  /// Engine API timeout (in seconds)
  pub connect_timeout_secs: u64,
}

impl Default for AppSettings {
  fn default() -> Self {
    Self {
      system_socket: DEFAULT_SYSTEM_SOCKET.to_string(),
      user_socket: String::new(),
      user_label: String::new(),
      show_all_containers: false,
      log_filter: "info".to_string(),
      connect_timeout_secs: 120,
    }
  }
}

impl AppSettings {
  pub fn config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("imageside").join("settings.json")
  }

  pub fn load() -> Self {
    Self::load_from(&Self::config_path())
  }

  pub fn load_from(path: &Path) -> Self {
    if path.exists() {
      match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
          Ok(settings) => return settings,
          Err(e) => tracing::warn!("Failed to parse settings: {}", e),
        },
        Err(e) => tracing::warn!("Failed to read settings file: {}", e),
      }
    }
    Self::default()
  }

  pub fn save(&self) -> Result<()> {
    self.save_to(&Self::config_path())
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(self)?;
    fs::write(path, content)?;
    Ok(())
  }

  pub fn user_socket_path(&self) -> String {
    if !self.user_socket.is_empty() {
      return self.user_socket.clone();
    }
    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
      .map(PathBuf::from)
      .or_else(dirs::runtime_dir)
      .unwrap_or_else(std::env::temp_dir);
    runtime_dir.join("podman").join("podman.sock").display().to_string()
  }

  pub fn user_label(&self) -> String {
    if !self.user_label.is_empty() {
      return self.user_label.clone();
    }
    std::env::var("USER").unwrap_or_else(|_| "user".to_string())
  }
}
