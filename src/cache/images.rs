//! Local Image Cache
//!
//! Keeps a full-size copy and a thumbnail of every catalog image on local disk.
//! Each asset gets a directory named by its cache key holding `<name>` and
//! `thumbnail_<name>`. File presence is the only cache check.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tracing::{debug, info, warn};

use super::types::{cache_key, Asset};
use crate::drive::SharedStore;
use crate::error::CatalogError;

/// Prefix of the derived thumbnail file
pub const THUMBNAIL_PREFIX: &str = "thumbnail_";

/// Default thumbnail edge in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 200;

/// Which cached copy to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
    Full,
    Thumb,
}

impl FromStr for ImageVariant {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ImageVariant::Full),
            "thumb" => Ok(ImageVariant::Thumb),
            other => Err(CatalogError::InvalidArgument(format!(
                "type must be 'full' or 'thumb', got '{other}'"
            ))),
        }
    }
}

/// Result of a materialization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// Both files were already on disk
    Cached,
    /// Downloaded and written
    Fetched,
    /// Only the thumbnail was missing and was rebuilt from the local copy
    Derived,
    /// Asset has no downloadable content or an unusable name
    Skipped,
    /// Download, decode or write failed; logged and swallowed
    Failed,
}

/// Local paths for one asset
struct EntryPaths {
    dir: PathBuf,
    full: PathBuf,
    thumb: PathBuf,
}

pub struct ImageCache {
    /// Root directory for cached images
    cache_dir: PathBuf,
    store: SharedStore,
    thumbnail_size: u32,
}

impl ImageCache {
    /// Default cache root under the user's cache directory
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("recipe-gallery")
            .join("images")
    }

    /// Create an image cache rooted at `cache_dir`
    pub fn with_config(cache_dir: PathBuf, store: SharedStore, thumbnail_size: u32) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create image cache directory: {:?}", cache_dir))?;

        let cache = Self {
            cache_dir,
            store,
            thumbnail_size,
        };

        cache.cleanup();

        info!(
            cache_dir = %cache.cache_dir.display(),
            thumbnail_size,
            "Image cache initialized"
        );

        Ok(cache)
    }

    /// Ensure both local copies of `asset` exist. Never fails; problems are logged.
    pub async fn materialize(&self, asset: &Asset) -> Materialized {
        match self.try_materialize(asset).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(file_id = %asset.id, name = %asset.name, error = %format!("{e:#}"), "Failed to cache image");
                Materialized::Failed
            }
        }
    }

    /// Materialize assets one at a time, returning how many failed
    pub async fn materialize_all<'a, I>(&self, assets: I) -> usize
    where
        I: IntoIterator<Item = &'a Asset>,
    {
        let mut failed = 0;
        for asset in assets {
            if self.materialize(asset).await == Materialized::Failed {
                failed += 1;
            }
        }
        failed
    }

    async fn try_materialize(&self, asset: &Asset) -> Result<Materialized> {
        if asset.remote_content_link.is_none() {
            debug!(file_id = %asset.id, "No content link, skipping image cache");
            return Ok(Materialized::Skipped);
        }
        let Some(paths) = self.entry_paths(&asset.name) else {
            warn!(name = %asset.name, "Image name is not usable as a cache path");
            return Ok(Materialized::Skipped);
        };

        let has_full = exists(&paths.full).await;
        let has_thumb = exists(&paths.thumb).await;
        if has_full && has_thumb {
            debug!(name = %asset.name, "Image cache HIT");
            return Ok(Materialized::Cached);
        }

        tokio::fs::create_dir_all(&paths.dir)
            .await
            .with_context(|| format!("Failed to create cache entry: {:?}", paths.dir))?;

        let (bytes, outcome) = if has_full {
            debug!(name = %asset.name, "Thumbnail missing, deriving from local copy");
            let bytes = tokio::fs::read(&paths.full)
                .await
                .with_context(|| format!("Failed to read cached image: {:?}", paths.full))?;
            (bytes, Materialized::Derived)
        } else {
            debug!(name = %asset.name, "Image cache MISS, downloading");
            let bytes = self
                .store
                .download_file(&asset.id)
                .await
                .context("Failed to download image")?;
            (bytes, Materialized::Fetched)
        };

        let size = self.thumbnail_size;
        tokio::task::spawn_blocking(move || -> Result<()> {
            if !has_full {
                write_atomic(&paths.full, &bytes)?;
            }
            if !has_thumb {
                let thumbnail = render_thumbnail(&bytes, size, &paths.thumb)?;
                write_atomic(&paths.thumb, &thumbnail)?;
            }
            Ok(())
        })
        .await
        .context("Image cache task panicked")??;

        debug!(name = %asset.name, outcome = ?outcome, "Cached image");
        Ok(outcome)
    }

    /// Local path of a cached image if it has been materialized
    pub async fn resolve(&self, image_name: &str, variant: ImageVariant) -> Option<PathBuf> {
        let paths = self.entry_paths(image_name)?;
        let path = match variant {
            ImageVariant::Full => paths.full,
            ImageVariant::Thumb => paths.thumb,
        };
        exists(&path).await.then_some(path)
    }

    fn entry_paths(&self, name: &str) -> Option<EntryPaths> {
        let key = cache_key(name);
        if key.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return None;
        }
        let dir = self.cache_dir.join(key);
        Some(EntryPaths {
            full: dir.join(name),
            thumb: dir.join(format!("{THUMBNAIL_PREFIX}{name}")),
            dir,
        })
    }

    /// Remove temp files left by interrupted writes
    pub fn cleanup(&self) {
        let Ok(read_dir) = fs::read_dir(&self.cache_dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            for inner in fs::read_dir(&path).into_iter().flatten().flatten() {
                let inner_path = inner.path();
                if inner_path.extension().is_some_and(|ext| ext == "tmp") {
                    debug!(path = %inner_path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&inner_path);
                }
            }
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Write through a temp file in the same directory, then rename into place
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .suffix(".tmp")
        .tempfile_in(parent)
        .context("Failed to create temp file for image cache")?;

    tmp.write_all(data).context("Failed to write image cache file")?;

    tmp.persist(path)
        .with_context(|| format!("Failed to persist image cache file: {:?}", path))?;
    Ok(())
}

/// Decode, apply EXIF orientation, crop-resize to a square and re-encode
fn render_thumbnail(bytes: &[u8], size: u32, target: &Path) -> Result<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to sniff image format")?;
    let source_format = reader.format();

    let mut decoder = reader.into_decoder().context("Unsupported image format")?;
    let orientation = decoder.orientation().context("Failed to read image orientation")?;
    let mut img = DynamicImage::from_decoder(decoder).context("Failed to decode image")?;
    img.apply_orientation(orientation);

    let thumbnail = img.resize_to_fill(size, size, FilterType::Lanczos3);

    let format = ImageFormat::from_path(target)
        .ok()
        .or(source_format)
        .unwrap_or(ImageFormat::Png);
    let thumbnail = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(thumbnail.to_rgb8()),
        _ => thumbnail,
    };

    let mut out = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut out, format)
        .context("Failed to encode thumbnail")?;
    Ok(out.into_inner())
}
