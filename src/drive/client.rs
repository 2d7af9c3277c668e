//! Google Drive API Client
//!
//! Provides authenticated access to Drive v3 for folder listing, folder
//! creation, uploads and downloads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::errors::DriveError;
use super::store::{RemoteStore, UploadBody};
use super::types::{CreatedFile, DriveFile, FileList, FILE_FIELDS, FOLDER_MIME_TYPE};
use crate::cache::MetadataCache;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Largest page size files.list accepts
const LIST_PAGE_SIZE: u32 = 1000;

const MULTIPART_BOUNDARY: &str = "recipe_gallery_upload_boundary";

/// Credentials for exchanging a refresh token for a new access token
#[derive(Debug, Clone)]
pub struct RefreshCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Drive API client for making authenticated requests
#[derive(Clone)]
pub struct DriveClient {
    http_client: Client,
    /// Current bearer token (refreshable on 401)
    access_token: Arc<RwLock<String>>,
    refresh: Option<RefreshCredentials>,
    /// File records by id
    metadata: Arc<MetadataCache>,
}

impl DriveClient {
    /// Create a client from an access token and optional refresh credentials
    pub fn new(access_token: String, refresh: Option<RefreshCredentials>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            access_token: Arc::new(RwLock::new(access_token)),
            refresh,
            metadata: Arc::new(MetadataCache::new()),
        })
    }

    async fn token(&self) -> String {
        self.access_token.read().await.clone()
    }

    /// Exchange the refresh token for a fresh access token
    pub async fn refresh_auth(&self) -> Result<(), DriveError> {
        let Some(refresh) = &self.refresh else {
            return Err(DriveError::AuthExpired);
        };

        info!("Refreshing Drive access token...");

        let response = self
            .http_client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", refresh.client_id.as_str()),
                ("client_secret", refresh.client_secret.as_str()),
                ("refresh_token", refresh.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let token: TokenResponse = parse_json(response).await?;
        *self.access_token.write().await = token.access_token;

        info!("Drive access token refreshed");
        Ok(())
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, target: &str, f: F) -> Result<T, DriveError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, DriveError>>,
    {
        let backoff_ms = [500u64, 1000, 2000];
        let mut attempt = 0;

        loop {
            let err = match f().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt == MAX_RETRIES {
                error!(operation, target, error = %err, "Drive operation failed");
                return Err(err);
            }

            if matches!(err, DriveError::AuthExpired) {
                if attempt > 0 || self.refresh.is_none() {
                    return Err(err);
                }
                warn!(operation, "Access token expired, refreshing...");
                if let Err(refresh_err) = self.refresh_auth().await {
                    error!(error = %refresh_err, "Failed to refresh access token");
                    return Err(err);
                }
            }

            let delay = backoff_ms.get(attempt as usize).copied().unwrap_or(2000);
            warn!(
                operation,
                target,
                attempt = attempt + 1,
                max = MAX_RETRIES,
                delay_ms = delay,
                error = %err,
                "Retrying Drive operation"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Run files.list for a query, following page tokens
    async fn list(&self, query: &str) -> Result<Vec<DriveFile>, DriveError> {
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", fields.clone()),
                ("orderBy", "name".to_string()),
                ("pageSize", LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            debug!(query, page = ?page_token, "Listing files from Drive");

            let params = &params;
            let page: FileList = self
                .with_retry("list", query, move || async move {
                    let response = self
                        .http_client
                        .get(FILES_URL)
                        .bearer_auth(self.token().await)
                        .query(params)
                        .send()
                        .await?;
                    parse_json(response).await
                })
                .await?;

            all_files.extend(page.files);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(query, count = all_files.len(), "Listed files from Drive");
        Ok(all_files)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<DriveFile>, DriveError> {
        let mut query = format!("mimeType = '{FOLDER_MIME_TYPE}' and trashed = false");
        if let Some(parent) = parent_id {
            query = format!("'{}' in parents and {query}", escape_query(parent));
        }
        self.list(&query).await
    }

    async fn list_files_under(
        &self,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let mut query = format!("mimeType != '{FOLDER_MIME_TYPE}' and trashed = false");
        if let Some(folder) = folder_id {
            query = format!("'{}' in parents and {query}", escape_query(folder));
        }
        self.list(&query).await
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DriveError> {
        info!(name, parent = parent_id, "Creating Drive folder");

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let metadata = &metadata;
        let created: CreatedFile = self
            .with_retry("create_folder", name, move || async move {
                let response = self
                    .http_client
                    .post(FILES_URL)
                    .bearer_auth(self.token().await)
                    .query(&[("fields", "id")])
                    .json(metadata)
                    .send()
                    .await?;
                parse_json(response).await
            })
            .await?;

        info!(name, folder_id = %created.id, "Drive folder created");
        Ok(created.id)
    }

    async fn upload_file(
        &self,
        body: UploadBody,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, DriveError> {
        let data = body
            .into_bytes()
            .await
            .map_err(|e| DriveError::Request(format!("Failed to read upload body: {e}")))?;

        info!(file = name, size = data.len(), mime_type, "Uploading file to Drive");

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": mime_type,
            "parents": [parent_id],
        });
        let payload = related_body(&metadata, mime_type, &data);
        let payload = &payload;

        let created: CreatedFile = self
            .with_retry("upload", name, move || async move {
                let response = self
                    .http_client
                    .post(UPLOAD_URL)
                    .bearer_auth(self.token().await)
                    .query(&[("uploadType", "multipart"), ("fields", "id")])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                    )
                    .body(payload.clone())
                    .send()
                    .await?;
                parse_json(response).await
            })
            .await?;

        info!(file = name, file_id = %created.id, "File uploaded to Drive");
        Ok(created.id)
    }

    async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        if let Some(file) = self.metadata.get(id) {
            return Ok(file);
        }

        let url = format!("{FILES_URL}/{id}");
        let url = url.as_str();
        let file: DriveFile = self
            .with_retry("get_file", id, move || async move {
                let response = self
                    .http_client
                    .get(url)
                    .bearer_auth(self.token().await)
                    .query(&[("fields", FILE_FIELDS)])
                    .send()
                    .await?;
                parse_json(response).await
            })
            .await?;

        self.metadata.insert(file.clone());
        let (hits, misses) = self.metadata.stats();
        debug!(file_id = id, hits, misses, "File metadata fetched");
        Ok(file)
    }

    async fn download_file(&self, id: &str) -> Result<Vec<u8>, DriveError> {
        let url = format!("{FILES_URL}/{id}");
        let url = url.as_str();

        let bytes = self
            .with_retry("download", id, move || async move {
                let response = self
                    .http_client
                    .get(url)
                    .bearer_auth(self.token().await)
                    .query(&[("alt", "media")])
                    .send()
                    .await?;
                let response = check_status(response).await?;
                Ok(response.bytes().await?)
            })
            .await?;

        debug!(file_id = id, size = bytes.len(), "Downloaded file from Drive");
        Ok(bytes.to_vec())
    }
}

/// Turn a non-success response into a DriveError
async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriveError::from_status(status.as_u16(), &body))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, DriveError> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

/// Escape a value for use inside a single-quoted Drive query literal
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build a multipart/related body with JSON metadata and media parts
fn related_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("plain-id"), "plain-id");
        assert_eq!(escape_query("Ann's"), "Ann\\'s");
    }

    #[test]
    fn test_related_body_layout() {
        let metadata = serde_json::json!({ "name": "Pie-Cy_1.jpg" });
        let body = related_body(&metadata, "image/jpeg", b"JPEGDATA");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with(&format!("--{MULTIPART_BOUNDARY}\r\n")));
        assert!(text.contains(r#"{"name":"Pie-Cy_1.jpg"}"#));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\nJPEGDATA"));
        assert!(text.ends_with(&format!("--{MULTIPART_BOUNDARY}--\r\n")));
    }

    #[tokio::test]
    async fn test_refresh_without_credentials_fails() {
        let client = DriveClient::new("token".to_string(), None).unwrap();
        assert!(matches!(client.refresh_auth().await, Err(DriveError::AuthExpired)));
    }
}
