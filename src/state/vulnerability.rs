use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Leading digest algorithm (`sha256:`, `sha512:`, `blake3:` ...).
static DIGEST_SCHEME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:").expect("valid digest scheme pattern"));

/// Strip the digest-scheme prefix from an image id, if present.
pub fn strip_digest_scheme(id: &str) -> &str {
  DIGEST_SCHEME.find(id).map_or(id, |m| &id[m.end()..])
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vulnerability {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
}

/// Scan result for one image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
  #[serde(default)]
  pub vulnerabilities: Vec<Vulnerability>,
}

impl VulnerabilityInfo {
  pub fn count(&self) -> usize {
    self.vulnerabilities.len()
  }
}

/// Payload pushed by a scanner: image id (digest scheme optional) to scan result.
pub type VulnerabilityReport = HashMap<String, VulnerabilityInfo>;

/// Scan results keyed by image id without its digest scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VulnerabilityMap {
  entries: HashMap<String, VulnerabilityInfo>,
}

impl VulnerabilityMap {
  pub fn from_report(report: VulnerabilityReport) -> Self {
    let entries = report
      .into_iter()
      .map(|(id, info)| (strip_digest_scheme(&id).to_string(), info))
      .collect();
    Self { entries }
  }

  /// Look up an image by its full id; the digest scheme is ignored.
  pub fn get(&self, image_id: &str) -> Option<&VulnerabilityInfo> {
    self.entries.get(strip_digest_scheme(image_id))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
