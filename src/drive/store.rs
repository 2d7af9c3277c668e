//! Remote store abstraction
//!
//! The catalog and the image cache only talk to the remote file store through
//! [`RemoteStore`], so tests can substitute an in-memory store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::DriveError;
use super::types::DriveFile;

/// Content handed to [`RemoteStore::upload_file`]
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl UploadBody {
    /// Resolve the body into bytes, reading from disk for path bodies
    pub async fn into_bytes(self) -> Result<Vec<u8>, std::io::Error> {
        match self {
            UploadBody::Bytes(bytes) => Ok(bytes),
            UploadBody::Path(path) => tokio::fs::read(&path).await,
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Folders directly under `parent_id`, or every folder when `None`
    async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<DriveFile>, DriveError>;

    /// Non-folder files directly under `folder_id`, or every file when `None`
    async fn list_files_under(&self, folder_id: Option<&str>)
        -> Result<Vec<DriveFile>, DriveError>;

    /// Create a folder and return its id
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DriveError>;

    /// Upload a file and return its id
    async fn upload_file(
        &self,
        body: UploadBody,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, DriveError>;

    async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError>;

    /// Raw content of a file
    async fn download_file(&self, id: &str) -> Result<Vec<u8>, DriveError>;
}

pub type SharedStore = Arc<dyn RemoteStore>;
