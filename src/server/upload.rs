//! Multipart upload flow
//!
//! Files are spooled to temp files under the upload directory, pushed to the
//! remote store, and the new folder or pictures are pulled into the catalog.
//! Temp files are `NamedTempFile`s, so every early return removes them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::error::ApiError;
use super::handlers::parse_kind;
use super::AppState;
use crate::cache::types::recipe_folder_key;
use crate::cache::CollectionKind;
use crate::drive::UploadBody;
use crate::error::CatalogError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub(crate) struct UploadQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    message: String,
}

/// One uploaded file waiting on disk
struct SpooledFile {
    file_name: String,
    content_type: String,
    temp: NamedTempFile,
}

#[derive(Default)]
struct UploadForm {
    files: Vec<SpooledFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn required(&self, name: &str) -> Result<String, ApiError> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request(format!("Missing form field '{name}'")))
    }

    /// Delete the temp files, logging any that could not be removed
    fn close(self) {
        for file in self.files {
            let path = file.temp.path().to_path_buf();
            if let Err(e) = file.temp.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove upload temp file");
            }
        }
    }
}

pub(crate) async fn upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let form = spool(multipart, &state.upload_dir).await?;

    let message = match kind {
        CollectionKind::Recipes => upload_recipe(&state, &form).await?,
        CollectionKind::Pictures => upload_pictures(&state, &form).await?,
    };

    form.close();
    Ok(Json(UploadResponse { message }))
}

async fn spool(mut multipart: Multipart, upload_dir: &Path) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "files" && name != "files[]" {
            let value = field.text().await?;
            form.fields.insert(name, value);
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload_{}", form.files.len() + 1));
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let temp = tempfile::Builder::new()
            .prefix("upload_")
            .tempfile_in(upload_dir)?;
        let mut out = tokio::fs::File::from_std(temp.reopen()?);
        let mut size = 0usize;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len();
            out.write_all(&chunk).await?;
        }
        out.flush().await?;

        info!(file = %file_name, size, "Spooled upload");
        form.files.push(SpooledFile {
            file_name,
            content_type,
            temp,
        });
    }

    Ok(form)
}

async fn upload_recipe(state: &AppState, form: &UploadForm) -> Result<String, ApiError> {
    let recipe_name = form.required("recipeName")?;
    let author_name = form.required("authorName")?;
    let folder_key = recipe_folder_key(&recipe_name, &author_name);

    let cover = match state
        .search
        .search(&format!("{recipe_name} recipe image"))
        .await
    {
        Ok(image) => Some(image),
        Err(CatalogError::NotFound(reason)) => {
            warn!(folder = %folder_key, %reason, "No stock cover image, creating recipe without one");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let draft = state.catalog.begin_recipe(&folder_key).await?;
    let store = state.catalog.store();
    info!(folder = %draft.folder_key(), folder_id = %draft.folder_id(), "Created recipe folder");

    if let Some(image) = cover {
        let name = image.file_name(&folder_key);
        store
            .upload_file(UploadBody::Bytes(image.bytes), &name, &image.mime_type, draft.folder_id())
            .await?;
    }

    for (index, file) in form.files.iter().enumerate() {
        let name = description_name(&folder_key, index + 1, &file.file_name);
        store
            .upload_file(
                UploadBody::Path(file.temp.path().to_path_buf()),
                &name,
                &file.content_type,
                draft.folder_id(),
            )
            .await?;
    }

    draft.commit().await?;
    info!(folder = %folder_key, files = form.files.len(), "Recipe uploaded");
    Ok("Recipe uploaded successfully".to_string())
}

async fn upload_pictures(state: &AppState, form: &UploadForm) -> Result<String, ApiError> {
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files were uploaded"));
    }

    state.catalog.ensure_initialized().await;
    let folder = state.catalog.pictures_folder().await?;
    let store = state.catalog.store();

    let mut ids = Vec::with_capacity(form.files.len());
    for file in &form.files {
        let id = store
            .upload_file(
                UploadBody::Path(file.temp.path().to_path_buf()),
                &file.file_name,
                &file.content_type,
                &folder,
            )
            .await?;
        ids.push(id);
    }

    state.catalog.append_pictures(&ids).await?;
    info!(count = ids.len(), "Pictures uploaded");
    Ok("Files uploaded successfully".to_string())
}

/// `<folderKey>_<n>` keeping the uploaded file's extension
fn description_name(folder_key: &str, n: usize, original: &str) -> String {
    match Path::new(original).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{folder_key}_{n}.{ext}"),
        _ => format!("{folder_key}_{n}"),
    }
}
