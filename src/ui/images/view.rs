use chrono::{DateTime, Utc};

use crate::docker::{ImageInfo, Scope, UsageMap};
use crate::state::{DeleteFlow, DeleteTarget, ImagesState};

use super::rows::{empty_caption, filter_images, project, ImageMap, ImageRow, RowContext};

/// Inputs owned by the embedding application
#[derive(Debug, Clone, Default)]
pub struct ImagesProps {
  /// `None` while the first listing is still loading
  pub images: Option<ImageMap>,
  pub container_usage: Option<UsageMap>,
  pub text_filter: String,
  pub user: String,
  pub user_service_available: bool,
  pub system_service_available: bool,
  pub show_all: bool,
}

impl ImagesProps {
  /// Scopes the pull dialog may target.
  pub fn available_scopes(&self) -> Vec<Scope> {
    let mut scopes = Vec::new();
    if self.system_service_available {
      scopes.push(Scope::System);
    }
    if self.user_service_available {
      scopes.push(Scope::User);
    }
    scopes
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveErrorDialog {
  pub target: DeleteTarget,
  pub reason: String,
  /// A force removal was issued and has not returned yet
  pub forcing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDialog {
  pub scopes: Vec<Scope>,
  pub user: String,
}

/// Everything the presentation layer renders for the images list
#[derive(Debug, Clone, PartialEq)]
pub struct ImagesView {
  pub rows: Vec<ImageRow>,
  /// Set only when there are no rows
  pub empty_caption: Option<&'static str>,
  pub delete_confirm: Option<DeleteTarget>,
  pub remove_error: Option<RemoveErrorDialog>,
  pub run_image: Option<ImageInfo>,
  pub search: Option<SearchDialog>,
  pub download_label: Option<String>,
}

impl ImagesView {
  pub fn build(props: &ImagesProps, state: &ImagesState, now: DateTime<Utc>) -> Self {
    let ctx = RowContext {
      vulnerabilities: &state.vulnerabilities,
      usage: props.container_usage.as_ref(),
      user_label: &props.user,
      show_all: props.show_all,
      expanded_row: state.expanded_row.as_deref(),
      now,
    };

    let rows: Vec<ImageRow> = props
      .images
      .as_ref()
      .map(|images| {
        filter_images(images, &props.text_filter)
          .into_iter()
          .map(|image| project(image, &ctx))
          .collect()
      })
      .unwrap_or_default();

    let caption = rows
      .is_empty()
      .then(|| empty_caption(props.images.as_ref(), &props.text_filter));

    let remove_error = state.delete_flow.remove_error().map(|(target, reason)| RemoveErrorDialog {
      target: target.clone(),
      reason: reason.to_string(),
      forcing: matches!(state.delete_flow, DeleteFlow::ForceRemoving { .. }),
    });

    Self {
      rows,
      empty_caption: caption,
      delete_confirm: state.delete_flow.confirming().cloned(),
      remove_error,
      run_image: state.run_image.clone(),
      search: state.search_open.then(|| SearchDialog {
        scopes: props.available_scopes(),
        user: props.user.clone(),
      }),
      download_label: state
        .download_in_progress
        .as_ref()
        .map(|name| format!("Pulling {name}...")),
    }
  }
}
