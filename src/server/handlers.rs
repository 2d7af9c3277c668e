use std::collections::BTreeMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::cache::paging::{parse_page, ItemCount};
use crate::cache::{CollectionKind, ImageVariant, Items, Phase};
use crate::drive::DriveFile;

pub(crate) const USAGE: &str = "Use /api/items?type=recipes|pictures&page=N[&slideshow] for paged items, \
/api/itemCount?type=recipes|pictures for counts, /api/recipes[?name=<folder>] for recipes, \
/image/<name>?type=full|thumb for cached images, /api/files for all files, \
/api/folders for files grouped by folder. POST /api/upload?type=recipes|pictures to upload.";

#[derive(Debug, Deserialize)]
pub(crate) struct ItemsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    page: Option<String>,
    /// Presence alone enables slideshow mode
    slideshow: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecipeQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageQuery {
    #[serde(rename = "type")]
    variant: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InitializeResponse {
    message: &'static str,
    recipes: usize,
    pictures: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct FolderEntry {
    name: String,
    files: Vec<FolderFile>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FolderFile {
    id: String,
    name: String,
    link: Option<String>,
}

pub(crate) fn parse_kind(raw: Option<&str>) -> Result<CollectionKind, ApiError> {
    Ok(raw.unwrap_or_default().parse::<CollectionKind>()?)
}

pub(crate) async fn usage() -> &'static str {
    USAGE
}

pub(crate) async fn items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Items>, ApiError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let page = parse_page(query.page.as_deref());
    let slideshow = query.slideshow.is_some();

    state.catalog.ensure_initialized().await;
    let snapshot = state.catalog.snapshot(kind).await;
    debug!(%kind, page, slideshow, total = snapshot.len(), "Serving items");

    Ok(Json(state.pager.paginate(snapshot, page, slideshow)))
}

pub(crate) async fn item_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemCount>, ApiError> {
    let kind = parse_kind(query.kind.as_deref())?;
    state.catalog.ensure_initialized().await;
    Ok(Json(state.pager.count(state.catalog.len(kind).await)))
}

pub(crate) async fn recipes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecipeQuery>,
) -> Result<Response, ApiError> {
    state.catalog.ensure_initialized().await;
    match query.name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => Ok(Json(state.catalog.find_recipe(name).await?).into_response()),
        None => Ok(Json(state.catalog.snapshot(CollectionKind::Recipes).await).into_response()),
    }
}

pub(crate) async fn initialize(State(state): State<Arc<AppState>>) -> Json<InitializeResponse> {
    state.catalog.initialize().await;
    let message = match state.catalog.phase().await {
        Phase::Populated => "Catalog initialized",
        _ => "Catalog scan failed, it will be retried on the next request",
    };
    Json(InitializeResponse {
        message,
        recipes: state.catalog.len(CollectionKind::Recipes).await,
        pictures: state.catalog.len(CollectionKind::Pictures).await,
    })
}

pub(crate) async fn files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DriveFile>>, ApiError> {
    Ok(Json(state.catalog.store().list_files_under(None).await?))
}

pub(crate) async fn folders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, FolderEntry>>, ApiError> {
    let store = state.catalog.store();
    let folders = store.list_folders(None).await?;
    let files = store.list_files_under(None).await?;
    Ok(Json(group_by_folder(folders, files)))
}

/// Folder id -> folder name and the files whose first parent it is
fn group_by_folder(folders: Vec<DriveFile>, files: Vec<DriveFile>) -> BTreeMap<String, FolderEntry> {
    let mut grouped: BTreeMap<String, FolderEntry> = folders
        .into_iter()
        .map(|folder| {
            (
                folder.id,
                FolderEntry {
                    name: folder.name,
                    files: Vec::new(),
                },
            )
        })
        .collect();

    for file in files {
        let Some(entry) = file.parent().and_then(|parent| grouped.get_mut(parent)) else {
            continue;
        };
        entry.files.push(FolderFile {
            id: file.id,
            name: file.name,
            link: file.web_view_link,
        });
    }
    grouped
}

pub(crate) async fn image(
    State(state): State<Arc<AppState>>,
    Path(image_name): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    let variant = match query.variant.as_deref() {
        None => ImageVariant::Full,
        Some(raw) => raw.parse::<ImageVariant>()?,
    };

    let path = state
        .images
        .resolve(&image_name, variant)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Image '{image_name}' is not cached")))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("Image '{image_name}' is not cached")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
