//! Drive API types
//!
//! Defines the file records returned by the Google Drive v3 API.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Field selector requested for every file record
pub const FILE_FIELDS: &str = "id, name, mimeType, webViewLink, webContentLink, parents, owners(displayName)";

/// Owner entry on a Drive file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Drive file/folder record from API responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// Stable Drive identifier
    pub id: String,
    /// Display name (not a path)
    pub name: String,
    /// MIME type, folders use [`FOLDER_MIME_TYPE`]
    #[serde(default)]
    pub mime_type: String,
    /// Browser link to the file
    #[serde(default)]
    pub web_view_link: Option<String>,
    /// Direct download link (absent for Google-native documents and folders)
    #[serde(default)]
    pub web_content_link: Option<String>,
    /// Parent folder ids
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub owners: Vec<Owner>,
}

/// Response from files.list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    /// Token for the next page (None if no more files)
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Response from files.create
#[derive(Debug, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

impl DriveFile {
    /// Check if this entry represents a folder
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// First owner's display name, if Drive returned one
    pub fn owner_name(&self) -> Option<&str> {
        self.owners
            .iter()
            .find_map(|owner| owner.display_name.as_deref())
    }

    /// First parent folder id
    pub fn parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}
