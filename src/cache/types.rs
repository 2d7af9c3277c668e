//! Catalog item types

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::drive::DriveFile;
use crate::error::CatalogError;

/// A single remote image tracked by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub remote_view_link: Option<String>,
    pub remote_content_link: Option<String>,
    pub author: Option<String>,
}

impl From<DriveFile> for Asset {
    fn from(file: DriveFile) -> Self {
        let author = file.owner_name().map(str::to_string);
        Self {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            remote_view_link: file.web_view_link,
            remote_content_link: file.web_content_link,
            author,
        }
    }
}

/// Local cache key: the name up to its first `.`
pub fn cache_key(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// One recipe folder, keyed by `<name>-<author>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub folder_name: String,
    pub cover_image: Option<Asset>,
    pub description_images: Vec<Asset>,
}

impl Recipe {
    /// Split a folder's files into cover and description images.
    ///
    /// The cover is the file whose cache key equals the folder name; the rest
    /// keep their listing order.
    pub fn from_files(folder_name: String, files: Vec<DriveFile>) -> Self {
        let mut cover_image = None;
        let mut description_images = Vec::new();

        for file in files {
            let asset = Asset::from(file);
            if cover_image.is_none() && is_cover_name(&asset.name, &folder_name) {
                cover_image = Some(asset);
            } else {
                description_images.push(asset);
            }
        }

        Self {
            folder_name,
            cover_image,
            description_images,
        }
    }

    /// Cover followed by description images
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.cover_image.iter().chain(self.description_images.iter())
    }
}

/// The cover is named exactly after its folder, with or without an extension
fn is_cover_name(file_name: &str, folder_name: &str) -> bool {
    file_name
        .strip_prefix(folder_name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Folder key for a recipe upload
pub fn recipe_folder_key(recipe_name: &str, author_name: &str) -> String {
    format!("{}-{}", recipe_name.trim(), author_name.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Recipes,
    Pictures,
}

impl FromStr for CollectionKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recipes" => Ok(CollectionKind::Recipes),
            "pictures" => Ok(CollectionKind::Pictures),
            other => Err(CatalogError::InvalidArgument(format!(
                "type must be 'recipes' or 'pictures', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Recipes => f.write_str("recipes"),
            CollectionKind::Pictures => f.write_str("pictures"),
        }
    }
}

/// A copied-out collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Items {
    Recipes(Vec<Recipe>),
    Pictures(Vec<Asset>),
}

impl Items {
    pub fn len(&self) -> usize {
        match self {
            Items::Recipes(items) => items.len(),
            Items::Pictures(items) => items.len(),
        }
    }
}
