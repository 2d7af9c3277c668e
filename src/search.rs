//! Stock image search
//!
//! Looks up a cover photo for new recipes through Google Custom Search and
//! downloads the first hit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CatalogError, CatalogResult};

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A downloaded search result
#[derive(Debug, Clone)]
pub struct StockImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// File extension derived from the MIME type (`jpeg` becomes `jpg`)
    pub extension: String,
}

impl StockImage {
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension)
    }
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// First image result for `query`; NotFound when there are none
    async fn search(&self, query: &str) -> CatalogResult<StockImage>;
}

pub type SharedSearch = Arc<dyn ImageSearch>;

/// Search backend used when no API credentials are configured
pub struct DisabledSearch;

#[async_trait]
impl ImageSearch for DisabledSearch {
    async fn search(&self, query: &str) -> CatalogResult<StockImage> {
        debug!(query, "Image search disabled");
        Err(CatalogError::NotFound("image search is not configured".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

pub struct CustomSearchClient {
    http_client: Client,
    api_key: String,
    engine_id: String,
}

impl CustomSearchClient {
    pub fn new(api_key: String, engine_id: String) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http_client,
            api_key,
            engine_id,
        })
    }
}

fn remote(err: reqwest::Error) -> CatalogError {
    CatalogError::RemoteUnavailable(err.to_string())
}

#[async_trait]
impl ImageSearch for CustomSearchClient {
    async fn search(&self, query: &str) -> CatalogResult<StockImage> {
        debug!(query, "Searching for stock image");

        let response: SearchResponse = self
            .http_client
            .get(SEARCH_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("searchType", "image"),
                ("q", query),
                ("num", "1"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(remote)?
            .json()
            .await
            .map_err(remote)?;

        let Some(first) = response.items.into_iter().next() else {
            return Err(CatalogError::NotFound(format!("no images for '{query}'")));
        };

        let image = self
            .http_client
            .get(&first.link)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(remote)?;

        let mime_type = image
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = image.bytes().await.map_err(remote)?.to_vec();

        info!(query, url = %first.link, size = bytes.len(), "Downloaded stock image");

        Ok(StockImage {
            extension: extension_for(&mime_type),
            bytes,
            mime_type,
        })
    }
}

/// File extension for an image MIME type
fn extension_for(mime_type: &str) -> String {
    let subtype = mime_type
        .split(';')
        .next()
        .and_then(|essence| essence.trim().split('/').nth(1))
        .unwrap_or("jpg");
    match subtype {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        other => other.to_string(),
    }
}
