//! Row projection for the images list.
//!
//! Everything here is a pure function of its inputs; nothing reads or
//! writes the store.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::docker::{ImageInfo, ImageKey, ImageUsage, UsageMap};
use crate::state::{VulnerabilityInfo, VulnerabilityMap};

/// Images known to the engines, keyed by id and scope.
pub type ImageMap = HashMap<ImageKey, ImageInfo>;

/// Owner column for system-scoped images.
pub const SYSTEM_OWNER: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub enum RowTab {
  Details {
    image: ImageInfo,
  },
  Security {
    image: ImageInfo,
    info: VulnerabilityInfo,
  },
  UsedBy {
    containers: Option<Vec<ImageUsage>>,
    show_all: bool,
  },
}

impl RowTab {
  pub fn label(&self) -> &'static str {
    match self {
      RowTab::Details { .. } => "Details",
      RowTab::Security { .. } => "Security",
      RowTab::UsedBy { .. } => "Used By",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
  pub row_id: String,
  pub image: ImageInfo,
  pub name: String,
  /// Badge text, only when the image has at least one known vulnerability
  pub vulnerabilities: Option<String>,
  pub created: String,
  pub size: String,
  pub owner: String,
  pub tabs: Vec<RowTab>,
  pub expanded: bool,
}

/// Inputs shared by every row of one render.
pub struct RowContext<'a> {
  pub vulnerabilities: &'a VulnerabilityMap,
  pub usage: Option<&'a UsageMap>,
  pub user_label: &'a str,
  pub show_all: bool,
  pub expanded_row: Option<&'a str>,
  pub now: DateTime<Utc>,
}

pub fn project(image: &ImageInfo, ctx: &RowContext<'_>) -> ImageRow {
  let row_id = image.key().to_string();
  let info = ctx.vulnerabilities.get(&image.id);

  let vulnerabilities = info
    .map(VulnerabilityInfo::count)
    .filter(|count| *count > 0)
    .map(vulnerability_label);

  let owner = if image.is_system {
    SYSTEM_OWNER.to_string()
  } else {
    ctx.user_label.to_string()
  };

  let mut tabs = vec![RowTab::Details { image: image.clone() }];
  if let Some(info) = info {
    tabs.push(RowTab::Security {
      image: image.clone(),
      info: info.clone(),
    });
  }
  tabs.push(RowTab::UsedBy {
    containers: ctx.usage.and_then(|usage| usage.get(&image.key()).cloned()),
    show_all: ctx.show_all,
  });

  ImageRow {
    expanded: ctx.expanded_row == Some(row_id.as_str()),
    row_id,
    image: image.clone(),
    name: image.display_name(),
    vulnerabilities,
    created: format_age(image.created, ctx.now),
    size: image.display_size(),
    owner,
    tabs,
  }
}

pub fn vulnerability_label(count: usize) -> String {
  if count == 1 {
    "1 Vulnerability".to_string()
  } else {
    format!("{count} Vulnerabilities")
  }
}

/// Relative age of an image, e.g. "3 days ago".
pub fn format_age(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
  created.map_or_else(
    || "Unknown".to_string(),
    |created| {
      let duration = now.signed_duration_since(created);
      if duration.num_days() > 365 {
        format!("{} years ago", duration.num_days() / 365)
      } else if duration.num_days() > 30 {
        format!("{} months ago", duration.num_days() / 30)
      } else if duration.num_days() > 0 {
        format!("{} days ago", duration.num_days())
      } else if duration.num_hours() > 0 {
        format!("{} hours ago", duration.num_hours())
      } else {
        "just now".to_string()
      }
    },
  )
}

/// Whether any repo tag of `image` contains `filter`, ignoring case.
/// An empty filter matches everything.
pub fn matches_filter(image: &ImageInfo, filter: &str) -> bool {
  if filter.is_empty() {
    return true;
  }
  let filter = filter.to_lowercase();
  image.repo_tags.iter().any(|tag| tag.to_lowercase().contains(&filter))
}

/// Images passing `filter`, newest first.
pub fn filter_images<'a>(images: &'a ImageMap, filter: &str) -> Vec<&'a ImageInfo> {
  let mut filtered: Vec<&ImageInfo> = images.values().filter(|img| matches_filter(img, filter)).collect();
  filtered.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.key().cmp(&b.key())));
  filtered
}

/// Caption shown when the list has no rows.
pub fn empty_caption(images: Option<&ImageMap>, filter: &str) -> &'static str {
  match images {
    None => "Loading...",
    Some(_) if !filter.is_empty() => "No images that match the current filter",
    Some(_) => "No images",
  }
}
