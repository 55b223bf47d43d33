use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use regex::Regex;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imageside::docker::{ImageGateway, ImageInfo, PodmanGateway, Scope, UsageMap};
use imageside::services::{ImageOperations, Notification, VulnerabilityFeed, VulnerabilitySubscription};
use imageside::state::{
  strip_digest_scheme, AppSettings, ImagesChanged, ImagesState, ImagesStore, VulnerabilityReport,
};
use imageside::ui::images::{ImageMap, ImagesProps, ImagesView};

#[derive(Parser)]
#[command(name = "imageside", version, about = "Manage Podman images across system and user engines")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// List images of every reachable engine
  List {
    /// Case-insensitive substring matched against repo tags
    #[arg(short, long, default_value = "")]
    filter: String,
  },
  /// Pull an image
  Pull {
    name: String,
    #[arg(short, long)]
    tag: Option<String>,
    /// Pull into the user engine instead of the system engine
    #[arg(long)]
    user: bool,
  },
  /// Remove an image by id, id prefix or repo tag
  Rm {
    image: String,
    #[arg(long)]
    user: bool,
    /// Force the removal if the plain removal fails
    #[arg(long)]
    force: bool,
  },
  /// Write the effective settings to the config file
  Init,
  /// Apply a vulnerability report (JSON) and list images with their badges
  ScanReport {
    file: PathBuf,
    #[arg(short, long, default_value = "")]
    filter: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  let settings = AppSettings::load();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(2)
    .enable_all()
    .build()
    .context("Failed to initialize Tokio runtime")?;

  runtime.block_on(run(cli, settings))
}

async fn run(cli: Cli, settings: AppSettings) -> Result<()> {
  let gateway = Arc::new(
    PodmanGateway::connect(
      &settings.system_socket,
      &settings.user_socket_path(),
      settings.connect_timeout_secs,
    )
    .await,
  );
  let store = Arc::new(ImagesStore::new());
  let (notifications, mut notification_rx) = mpsc::unbounded_channel::<Notification>();
  let ops = ImageOperations::new(store.clone(), gateway.clone(), Arc::new(notifications));

  match cli.command {
    Command::List { filter } => {
      let props = load_props(gateway.as_ref(), &settings, filter).await;
      print_view(&ImagesView::build(&props, &store.snapshot(), Utc::now()));
    }
    Command::Pull { name, tag, user } => {
      let result = ops.pull(&name, tag.as_deref(), scope(user)).await;
      while let Ok(notification) = notification_rx.try_recv() {
        print_notification(&notification);
      }
      if result.is_err() {
        bail!("pull of {name} failed");
      }
    }
    Command::Rm { image, user, force } => {
      let props = load_props(gateway.as_ref(), &settings, String::new()).await;
      let images = props.images.unwrap_or_default();
      let target = find_image(&images, &image, scope(user))?;
      remove(&ops, target, force).await?;
    }
    Command::Init => {
      settings.save()?;
      print_line(&format!("Wrote {}", AppSettings::config_path().display()));
    }
    Command::ScanReport { file, filter } => {
      let content = tokio::fs::read_to_string(&file).await.with_context(|| format!("Failed to read {}", file.display()))?;
      let report: VulnerabilityReport = serde_json::from_str(&content).context("Failed to parse vulnerability report")?;

      let feed = VulnerabilityFeed::default();
      let subscription = VulnerabilitySubscription::start(&feed, store.clone());
      let mut changes = store.subscribe();
      feed.publish(report);
      tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(changed) = changes.recv().await {
          if changed == ImagesChanged::Vulnerabilities {
            break;
          }
        }
      })
      .await
      .context("Vulnerability report was not applied")?;
      subscription.shutdown().await;

      let props = load_props(gateway.as_ref(), &settings, filter).await;
      print_view(&ImagesView::build(&props, &store.snapshot(), Utc::now()));
    }
  }
  Ok(())
}

fn scope(user: bool) -> Scope {
  if user { Scope::User } else { Scope::System }
}

async fn remove(ops: &ImageOperations, image: &ImageInfo, force: bool) -> Result<()> {
  ops.request_delete(image);
  if ops.confirm_remove().await.is_some_and(|r| r.is_ok()) {
    print_line(&format!("Removed {}", image.display_name()));
    return Ok(());
  }

  let state: ImagesState = ops.store().snapshot();
  let reason = state
    .delete_flow
    .remove_error()
    .map(|(_, reason)| reason.to_string())
    .unwrap_or_default();

  if !force {
    ops.cancel_remove_error();
    bail!("Failed to remove {}: {reason} (use --force to remove anyway)", image.display_name());
  }

  print_line(&format!("Plain removal failed ({reason}), forcing"));
  // Force failures are only logged by the operation; report what the engine still has.
  let _ = ops.force_remove().await;
  let still_present = ops
    .gateway()
    .list_images(Scope::from_is_system(image.is_system))
    .await
    .map(|images| images.iter().any(|i| i.id == image.id))
    .unwrap_or(false);
  if still_present {
    bail!("{} is still present after forced removal", image.display_name());
  }
  print_line(&format!("Removed {}", image.display_name()));
  Ok(())
}

/// Hex image id, optionally with its digest scheme.
static ID_PREFIX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(?:sha256:)?([0-9a-f]+)$").expect("valid id prefix pattern"));

/// Resolve `query` to one image of `scope`: an exact id, then an exact repo
/// tag, then an id prefix. Queries matching several images are refused.
fn find_image<'a>(images: &'a ImageMap, query: &str, scope: Scope) -> Result<&'a ImageInfo> {
  let in_scope = move || images.values().filter(move |image| image.is_system == scope.is_system());

  let mut matches: Vec<&ImageInfo> = in_scope().filter(|image| image.id == query).collect();
  if matches.is_empty() {
    matches = in_scope()
      .filter(|image| image.repo_tags.iter().any(|tag| tag == query))
      .collect();
  }
  if matches.is_empty()
    && let Some(prefix) = ID_PREFIX.captures(query).and_then(|c| c.get(1))
  {
    matches = in_scope()
      .filter(|image| strip_digest_scheme(&image.id).starts_with(prefix.as_str()))
      .collect();
  }

  match matches.as_slice() {
    [] => bail!("no {scope} image matches {query}"),
    [image] => Ok(*image),
    _ => bail!("{query} matches {} {scope} images, use a longer id", matches.len()),
  }
}

async fn load_props(gateway: &dyn ImageGateway, settings: &AppSettings, text_filter: String) -> ImagesProps {
  let mut images = ImageMap::new();
  let mut usage = UsageMap::new();

  for scope in [Scope::System, Scope::User] {
    if !gateway.is_available(scope) {
      continue;
    }
    match gateway.list_images(scope).await {
      Ok(list) => images.extend(list.into_iter().map(|image| (image.key(), image))),
      Err(e) => tracing::warn!(%scope, "Failed to list images: {}", e),
    }
    match gateway.image_usage(scope, settings.show_all_containers).await {
      Ok(map) => usage.extend(map),
      Err(e) => tracing::warn!(%scope, "Failed to list containers: {}", e),
    }
  }

  ImagesProps {
    images: Some(images),
    container_usage: Some(usage),
    text_filter,
    user: settings.user_label(),
    user_service_available: gateway.is_available(Scope::User),
    system_service_available: gateway.is_available(Scope::System),
    show_all: settings.show_all_containers,
  }
}

fn print_view(view: &ImagesView) {
  if let Some(caption) = view.empty_caption {
    print_line(caption);
    return;
  }
  for row in &view.rows {
    print_line(&format!(
      "{:<40} {:<18} {:<14} {:>10} {}",
      row.name,
      row.vulnerabilities.as_deref().unwrap_or(""),
      row.created,
      row.size,
      row.owner
    ));
  }
}

fn print_notification(notification: &Notification) {
  print_line(&format!("{}\n  {}", notification.error, notification.detail));
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
  println!("{line}");
}
