use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DockerClient, GatewayError};

/// Identity of an image within one scope. The same content hash may exist in
/// both the system and a user's store, so the scope is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageKey {
    pub id: String,
    pub is_system: bool,
}

impl ImageKey {
    pub fn new(id: impl Into<String>, is_system: bool) -> Self {
        Self {
            id: id.into(),
            is_system,
        }
    }
}

/// Row identifier used by the presentation layer: the id followed by the scope flag.
impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id, self.is_system)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "engine_time::deserialize")]
    pub created: Option<DateTime<Utc>>,
    pub size: i64,
    pub is_system: bool,
}

impl ImageInfo {
    pub fn key(&self) -> ImageKey {
        ImageKey::new(self.id.clone(), self.is_system)
    }

    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        if id.len() >= 12 {
            &id[..12]
        } else {
            id
        }
    }

    pub fn display_name(&self) -> String {
        self.repo_tags
            .first()
            .cloned()
            .unwrap_or_else(|| self.short_id().to_string())
    }

    pub fn display_size(&self) -> String {
        bytesize::ByteSize(u64::try_from(self.size).unwrap_or(0)).to_string()
    }
}

/// Parse an engine timestamp. Accepts RFC 3339 and Go's default
/// `time.Time` layout (`2006-01-02 15:04:05.999999999 -0700 MST`).
pub fn parse_engine_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Go appends the zone abbreviation after the numeric offset; chrono
    // cannot parse abbreviations, and the offset already carries the zone.
    let without_zone_name = match raw.rsplit_once(' ') {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_alphabetic()) => head,
        _ => raw,
    };
    DateTime::parse_from_str(without_zone_name, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

mod engine_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Unix(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Unix(ts)) => DateTime::from_timestamp(ts, 0),
            Some(Raw::Text(text)) => super::parse_engine_timestamp(&text),
            None => None,
        })
    }
}

/// Split `name[:tag]` into repository and tag, keeping registry ports intact.
fn split_reference(image: &str) -> (&str, &str) {
    if let Some(pos) = image.rfind(':') {
        let after_colon = &image[pos + 1..];
        if after_colon.contains('/') || after_colon.parse::<u16>().is_ok() {
            // localhost:5000/image
            (image, "latest")
        } else {
            (&image[..pos], after_colon)
        }
    } else {
        (image, "latest")
    }
}

impl DockerClient {
    pub async fn list_images(&self, is_system: bool) -> Result<Vec<ImageInfo>, GatewayError> {
        let docker = self
            .client()
            .map_err(|e| GatewayError::new(super::CONNECTION_ERROR, e.to_string()))?;

        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = docker.list_images(Some(options)).await?;

        let mut result: Vec<ImageInfo> = images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                repo_tags: image
                    .repo_tags
                    .into_iter()
                    .filter(|t| t != "<none>:<none>")
                    .collect(),
                created: DateTime::from_timestamp(image.created, 0),
                size: image.size,
                is_system,
            })
            .collect();

        result.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(result)
    }

    pub async fn remove_image(&self, id: &str, force: bool) -> Result<(), GatewayError> {
        let docker = self
            .client()
            .map_err(|e| GatewayError::new(super::CONNECTION_ERROR, e.to_string()))?;
        docker
            .remove_image(
                id,
                Some(RemoveImageOptions {
                    force,
                    noprune: false,
                }),
                None,
            )
            .await?;
        Ok(())
    }

    /// Pull an image and wait for the engine to finish.
    pub async fn pull_image(&self, reference: &str) -> Result<(), GatewayError> {
        let docker = self
            .client()
            .map_err(|e| GatewayError::new(super::CONNECTION_ERROR, e.to_string()))?;

        let (repo, tag) = split_reference(reference);

        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                tracing::trace!(reference, %status, "pull progress");
            }
        }

        Ok(())
    }
}
