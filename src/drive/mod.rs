//! Google Drive remote store

pub mod client;
pub mod errors;
#[cfg(test)]
pub mod fake;
pub mod store;
pub mod types;

pub use client::{DriveClient, RefreshCredentials};
pub use errors::DriveError;
pub use store::{RemoteStore, SharedStore, UploadBody};
pub use types::*;
