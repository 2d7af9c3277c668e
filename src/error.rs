//! Catalog error taxonomy

use crate::drive::DriveError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Local I/O failure: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl From<DriveError> for CatalogError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::NotFound(what) => CatalogError::NotFound(what),
            other => CatalogError::RemoteUnavailable(other.to_string()),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
