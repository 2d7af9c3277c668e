//! In-memory remote store for tests

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use super::errors::DriveError;
use super::store::{RemoteStore, UploadBody};
use super::types::{DriveFile, FOLDER_MIME_TYPE};

/// Small encoded PNG for seeding image files
pub fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 3, Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Default)]
pub struct FakeStore {
    /// Files and folders in insertion order
    files: Mutex<Vec<DriveFile>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicUsize,
    pub folder_listings: AtomicUsize,
    pub downloads: AtomicUsize,
    pub failing: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check(&self) -> Result<(), DriveError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DriveError::Network("store offline".to_string()));
        }
        Ok(())
    }

    pub fn add_folder(&self, name: &str, parent: Option<&str>) -> String {
        let id = self.next_id("folder");
        self.files.lock().unwrap().push(DriveFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            web_view_link: None,
            web_content_link: None,
            parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
            owners: Vec::new(),
        });
        id
    }

    pub fn add_file(&self, name: &str, parent: &str, bytes: Vec<u8>) -> String {
        let id = self.next_id("file");
        self.files.lock().unwrap().push(DriveFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            web_view_link: Some(format!("https://drive.test/view/{id}")),
            web_content_link: Some(format!("https://drive.test/content/{id}")),
            parents: vec![parent.to_string()],
            owners: Vec::new(),
        });
        self.blobs.lock().unwrap().insert(id.clone(), bytes);
        id
    }

    pub fn add_image(&self, name: &str, parent: &str) -> String {
        self.add_file(name, parent, png_bytes())
    }

    pub fn file_named(&self, name: &str) -> Option<DriveFile> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<DriveFile>, DriveError> {
        self.check()?;
        self.folder_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.is_folder())
            .filter(|f| parent_id.map_or(true, |p| f.parents.iter().any(|x| x == p)))
            .cloned()
            .collect())
    }

    async fn list_files_under(
        &self,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveFile>, DriveError> {
        self.check()?;
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| !f.is_folder())
            .filter(|f| folder_id.map_or(true, |p| f.parents.iter().any(|x| x == p)))
            .cloned()
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DriveError> {
        self.check()?;
        Ok(self.add_folder(name, Some(parent_id)))
    }

    async fn upload_file(
        &self,
        body: UploadBody,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, DriveError> {
        self.check()?;
        let bytes = body
            .into_bytes()
            .await
            .map_err(|e| DriveError::Request(e.to_string()))?;
        let id = self.add_file(name, parent_id, bytes);
        if let Some(file) = self.files.lock().unwrap().iter_mut().find(|f| f.id == id) {
            file.mime_type = mime_type.to_string();
        }
        Ok(id)
    }

    async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        self.check()?;
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| DriveError::NotFound(id.to_string()))
    }

    async fn download_file(&self, id: &str) -> Result<Vec<u8>, DriveError> {
        self.check()?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DriveError::NotFound(id.to_string()))
    }
}
