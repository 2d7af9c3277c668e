//! Environment configuration

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::cache::images::{ImageCache, DEFAULT_THUMBNAIL_SIZE};
use crate::cache::paging::{DEFAULT_PAGE_SIZE, DEFAULT_SLIDESHOW_SIZE};
use crate::cache::{Pager, SlideshowPaging};
use crate::drive::RefreshCredentials;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub image_cache_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub drive_access_token: String,
    pub drive_refresh: Option<RefreshCredentials>,
    pub recipes_folder_id: Option<String>,
    pub pictures_folder_id: Option<String>,
    /// Custom Search (api key, engine id)
    pub search: Option<(String, String)>,
    pub pager: Pager,
    pub thumbnail_size: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let drive_refresh = match (
            var("DRIVE_CLIENT_ID"),
            var("DRIVE_CLIENT_SECRET"),
            var("DRIVE_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(RefreshCredentials {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => {
                debug!("Drive refresh credentials incomplete, token refresh disabled");
                None
            }
        };

        let search = match (var("SEARCH_API_KEY"), var("SEARCH_ENGINE_ID")) {
            (Some(key), Some(engine)) => Some((key, engine)),
            _ => {
                info!("SEARCH_API_KEY/SEARCH_ENGINE_ID not set, stock image search disabled");
                None
            }
        };

        let pager = Pager {
            page_size: try_load(&var, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            slideshow_size: try_load(&var, "SLIDESHOW_SIZE", DEFAULT_SLIDESHOW_SIZE)?,
            slideshow_paging: try_load(&var, "SLIDESHOW_PAGING", SlideshowPaging::default())?,
        };
        if pager.page_size == 0 || pager.slideshow_size == 0 {
            return Err(anyhow!("PAGE_SIZE and SLIDESHOW_SIZE must be positive"));
        }

        Ok(Self {
            port: try_load(&var, "PORT", DEFAULT_PORT)?,
            image_cache_dir: var("IMAGE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(ImageCache::default_dir),
            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("recipe-gallery").join("uploads")),
            max_upload_bytes: try_load(&var, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            drive_access_token: var("DRIVE_ACCESS_TOKEN").unwrap_or_default(),
            drive_refresh,
            recipes_folder_id: var("RECIPES_FOLDER_ID"),
            pictures_folder_id: var("PICTURES_FOLDER_ID"),
            search,
            pager,
            thumbnail_size: try_load(&var, "THUMBNAIL_SIZE", DEFAULT_THUMBNAIL_SIZE)?,
        })
    }
}

/// Parse `key` if set, otherwise use `default`
fn try_load<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value '{raw}': {e}")),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
