//! Catalog Cache
//!
//! In-process mirror of the recipe and picture folders. Populated by one full
//! scan, then only ever grown by prepending newly uploaded items, so the most
//! recent uploads come first and the scan order is preserved beneath them.
//!
//! Lifecycle is `Empty -> Initializing -> Populated`. Scans are serialized so
//! concurrent callers run at most one; a failed scan falls back to `Empty` and
//! is retried by the next caller.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use super::images::ImageCache;
use super::types::{Asset, CollectionKind, Items, Recipe};
use crate::drive::{DriveFile, SharedStore};
use crate::error::{CatalogError, CatalogResult};

/// Folder names used when root ids are not configured
pub const RECIPES_ROOT_NAME: &str = "Recipes";
pub const PICTURES_ROOT_NAME: &str = "Pictures";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Initializing,
    Populated,
}

struct CatalogState {
    phase: Phase,
    recipes: VecDeque<Recipe>,
    pictures: VecDeque<Asset>,
}

/// Root folder ids, resolved by name on first use when not configured
struct RootFolders {
    recipes: OnceCell<String>,
    pictures: OnceCell<String>,
}

pub struct Catalog {
    store: SharedStore,
    images: Arc<ImageCache>,
    roots: RootFolders,
    state: RwLock<CatalogState>,
    /// Serializes full scans
    init_lock: Mutex<()>,
    /// Serializes recipe create-or-reject
    create_lock: Mutex<()>,
}

/// A recipe folder created remotely but not yet in the catalog.
///
/// Holds the creation lock, so no other recipe can be created until this draft
/// is committed or dropped.
pub struct RecipeDraft<'a> {
    catalog: &'a Catalog,
    folder_key: String,
    folder_id: String,
    _guard: MutexGuard<'a, ()>,
}

impl RecipeDraft<'_> {
    pub fn folder_key(&self) -> &str {
        &self.folder_key
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Pull the finished folder into the catalog
    pub async fn commit(self) -> CatalogResult<Recipe> {
        self.catalog
            .append_recipe_folder(&self.folder_id, self.folder_key)
            .await
    }
}

impl Catalog {
    pub fn new(
        store: SharedStore,
        images: Arc<ImageCache>,
        recipes_root: Option<String>,
        pictures_root: Option<String>,
    ) -> Self {
        Self {
            store,
            images,
            roots: RootFolders {
                recipes: OnceCell::new_with(recipes_root),
                pictures: OnceCell::new_with(pictures_root),
            },
            state: RwLock::new(CatalogState {
                phase: Phase::Empty,
                recipes: VecDeque::new(),
                pictures: VecDeque::new(),
            }),
            init_lock: Mutex::new(()),
            create_lock: Mutex::new(()),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    /// Scan the remote store once. Later calls are no-ops; scan failures are
    /// logged and leave the catalog empty.
    pub async fn initialize(&self) {
        let _init = self.init_lock.lock().await;

        {
            let mut state = self.state.write().await;
            if state.phase == Phase::Populated {
                debug!("Catalog already populated");
                return;
            }
            state.phase = Phase::Initializing;
        }

        info!("Scanning remote store for recipes and pictures...");

        let (recipes, pictures) = match self.scan().await {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "Catalog scan failed, will retry on next request");
                let mut state = self.state.write().await;
                state.phase = Phase::Empty;
                state.recipes.clear();
                state.pictures.clear();
                return;
            }
        };

        {
            let mut state = self.state.write().await;
            state.recipes = recipes.iter().cloned().collect();
            state.pictures = pictures.iter().cloned().collect();
            state.phase = Phase::Populated;
        }

        info!(
            recipes = recipes.len(),
            pictures = pictures.len(),
            "Catalog populated, caching images..."
        );

        let assets: Vec<&Asset> = recipes
            .iter()
            .flat_map(|r| r.assets())
            .chain(pictures.iter())
            .collect();
        let failed = self.images.materialize_all(assets).await;
        if failed > 0 {
            warn!(failed, "Some images could not be cached");
        }
        info!("Catalog initialization complete");
    }

    /// Initialize unless already populated
    pub async fn ensure_initialized(&self) {
        if self.phase().await != Phase::Populated {
            self.initialize().await;
        }
    }

    async fn scan(&self) -> CatalogResult<(Vec<Recipe>, Vec<Asset>)> {
        let recipes_root = self.recipes_root().await?;
        let pictures_root = self.pictures_root().await?;

        let mut recipes = Vec::new();
        for folder in self.store.list_folders(Some(&recipes_root)).await? {
            recipes.push(self.load_recipe(folder).await?);
        }

        let pictures = self
            .store
            .list_files_under(Some(&pictures_root))
            .await?
            .into_iter()
            .map(Asset::from)
            .collect();

        Ok((recipes, pictures))
    }

    async fn load_recipe(&self, folder: DriveFile) -> CatalogResult<Recipe> {
        let files = self.store.list_files_under(Some(&folder.id)).await?;
        Ok(Recipe::from_files(folder.name, files))
    }

    async fn recipes_root(&self) -> CatalogResult<String> {
        self.resolve_root(&self.roots.recipes, RECIPES_ROOT_NAME).await
    }

    async fn pictures_root(&self) -> CatalogResult<String> {
        self.resolve_root(&self.roots.pictures, PICTURES_ROOT_NAME).await
    }

    async fn resolve_root(&self, cell: &OnceCell<String>, name: &str) -> CatalogResult<String> {
        let id = cell
            .get_or_try_init(|| async {
                let folders = self.store.list_folders(None).await?;
                let folder = folders
                    .into_iter()
                    .find(|f| f.name == name)
                    .ok_or_else(|| CatalogError::NotFound(format!("root folder '{name}'")))?;
                info!(name, folder_id = %folder.id, "Resolved root folder");
                Ok::<_, CatalogError>(folder.id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Fetch one recipe folder by key, cache its images and put it first
    pub async fn append_recipe(&self, folder_key: &str) -> CatalogResult<Recipe> {
        let root = self.recipes_root().await?;
        let folder = self
            .store
            .list_folders(Some(&root))
            .await?
            .into_iter()
            .find(|f| f.name == folder_key)
            .ok_or_else(|| CatalogError::NotFound(format!("recipe folder '{folder_key}'")))?;

        self.append_recipe_folder(&folder.id, folder.name).await
    }

    /// Load a recipe from a known folder id, cache its images and put it first
    async fn append_recipe_folder(
        &self,
        folder_id: &str,
        folder_key: String,
    ) -> CatalogResult<Recipe> {
        let files = self.store.list_files_under(Some(folder_id)).await?;
        let recipe = Recipe::from_files(folder_key, files);
        let assets: Vec<&Asset> = recipe.assets().collect();
        self.images.materialize_all(assets).await;

        self.state.write().await.recipes.push_front(recipe.clone());
        info!(folder = %recipe.folder_name, folder_id, "Recipe added to catalog");
        Ok(recipe)
    }

    /// Fetch pictures by id, cache them and put them first in input order
    pub async fn append_pictures(&self, remote_ids: &[String]) -> CatalogResult<Vec<Asset>> {
        let mut assets = Vec::with_capacity(remote_ids.len());
        for id in remote_ids {
            assets.push(Asset::from(self.store.get_file(id).await?));
        }

        self.images.materialize_all(assets.iter()).await;

        let mut state = self.state.write().await;
        for asset in assets.iter().rev() {
            state.pictures.push_front(asset.clone());
        }
        info!(count = assets.len(), "Pictures added to catalog");
        Ok(assets)
    }

    /// Reject an existing recipe key, otherwise create its remote folder.
    ///
    /// The returned draft keeps recipe creation serialized until it is
    /// committed or dropped.
    pub async fn begin_recipe(&self, folder_key: &str) -> CatalogResult<RecipeDraft<'_>> {
        let guard = self.create_lock.lock().await;

        self.ensure_initialized().await;
        if self.phase().await != Phase::Populated {
            return Err(CatalogError::RemoteUnavailable(format!(
                "catalog scan failed, cannot check recipe '{folder_key}'"
            )));
        }
        if self.find_recipe(folder_key).await.is_ok() {
            return Err(CatalogError::AlreadyExists(format!("recipe '{folder_key}'")));
        }

        let root = self.recipes_root().await?;
        let folder_id = self.store.create_folder(folder_key, &root).await?;

        Ok(RecipeDraft {
            catalog: self,
            folder_key: folder_key.to_string(),
            folder_id,
            _guard: guard,
        })
    }

    pub async fn find_recipe(&self, folder_key: &str) -> CatalogResult<Recipe> {
        self.state
            .read()
            .await
            .recipes
            .iter()
            .find(|r| r.folder_name == folder_key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("recipe '{folder_key}'")))
    }

    /// Copy of one collection
    pub async fn snapshot(&self, kind: CollectionKind) -> Items {
        let state = self.state.read().await;
        match kind {
            CollectionKind::Recipes => Items::Recipes(state.recipes.iter().cloned().collect()),
            CollectionKind::Pictures => Items::Pictures(state.pictures.iter().cloned().collect()),
        }
    }

    pub async fn len(&self, kind: CollectionKind) -> usize {
        let state = self.state.read().await;
        match kind {
            CollectionKind::Recipes => state.recipes.len(),
            CollectionKind::Pictures => state.pictures.len(),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Id of the pictures root folder
    pub async fn pictures_folder(&self) -> CatalogResult<String> {
        self.pictures_root().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::images::DEFAULT_THUMBNAIL_SIZE;
    use crate::drive::fake::FakeStore;
    use crate::drive::RemoteStore;
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        store: Arc<FakeStore>,
        catalog: Arc<Catalog>,
        recipes_root: String,
        pictures_root: String,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(FakeStore::new());
        let recipes_root = store.add_folder(RECIPES_ROOT_NAME, None);
        let pictures_root = store.add_folder(PICTURES_ROOT_NAME, None);
        let images = Arc::new(
            ImageCache::with_config(dir.path().to_path_buf(), store.clone(), DEFAULT_THUMBNAIL_SIZE)
                .unwrap(),
        );
        let catalog = Arc::new(Catalog::new(store.clone(), images, None, None));
        Fixture {
            store,
            catalog,
            recipes_root,
            pictures_root,
            _dir: dir,
        }
    }

    fn add_recipe(fx: &Fixture, key: &str) -> String {
        let folder = fx.store.add_folder(key, Some(&fx.recipes_root));
        fx.store.add_image(&format!("{key}.png"), &folder);
        fx.store.add_image(&format!("{key}_1.png"), &folder);
        folder
    }

    fn names(items: Items) -> Vec<String> {
        match items {
            Items::Recipes(all) => all.into_iter().map(|r| r.folder_name).collect(),
            Items::Pictures(all) => all.into_iter().map(|a| a.name).collect(),
        }
    }

    #[tokio::test]
    async fn test_initialize_scans_recipes_and_pictures() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");
        fx.store.add_image("beach.png", &fx.pictures_root);

        fx.catalog.initialize().await;

        assert_eq!(fx.catalog.phase().await, Phase::Populated);
        let recipe = fx.catalog.find_recipe("Soup-Ann").await.unwrap();
        assert_eq!(recipe.cover_image.unwrap().name, "Soup-Ann.png");
        assert_eq!(recipe.description_images.len(), 1);
        assert_eq!(names(fx.catalog.snapshot(CollectionKind::Pictures).await), vec!["beach.png"]);
        assert!(fx._dir.path().join("beach").join("thumbnail_beach.png").exists());
    }

    #[tokio::test]
    async fn test_initialize_twice_scans_once() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");

        fx.catalog.initialize().await;
        let listings = fx.store.folder_listings.load(Ordering::SeqCst);
        fx.catalog.initialize().await;

        assert_eq!(fx.store.folder_listings.load(Ordering::SeqCst), listings);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_scans_once() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");

        let (a, b) = (fx.catalog.clone(), fx.catalog.clone());
        tokio::join!(a.initialize(), b.initialize());

        // root resolution (two listings) + one recipes listing
        assert_eq!(fx.store.folder_listings.load(Ordering::SeqCst), 3);
        assert_eq!(fx.catalog.len(CollectionKind::Recipes).await, 1);
    }

    #[tokio::test]
    async fn test_scan_failure_leaves_catalog_empty_and_retries() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");

        fx.store.failing.store(true, Ordering::SeqCst);
        fx.catalog.initialize().await;
        assert_eq!(fx.catalog.phase().await, Phase::Empty);
        assert_eq!(fx.catalog.len(CollectionKind::Recipes).await, 0);

        fx.store.failing.store(false, Ordering::SeqCst);
        fx.catalog.ensure_initialized().await;
        assert_eq!(fx.catalog.phase().await, Phase::Populated);
        assert_eq!(fx.catalog.len(CollectionKind::Recipes).await, 1);
    }

    #[tokio::test]
    async fn test_append_recipe_goes_first() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");
        add_recipe(&fx, "Cake-Bo");
        fx.catalog.initialize().await;

        add_recipe(&fx, "Pie-Cy");
        let appended = fx.catalog.append_recipe("Pie-Cy").await.unwrap();

        assert_eq!(
            names(fx.catalog.snapshot(CollectionKind::Recipes).await),
            vec!["Pie-Cy", "Soup-Ann", "Cake-Bo"]
        );
        assert_eq!(fx.catalog.find_recipe("Pie-Cy").await.unwrap(), appended);
    }

    #[tokio::test]
    async fn test_append_missing_recipe_is_not_found() {
        let fx = fixture();
        fx.catalog.initialize().await;
        assert!(matches!(
            fx.catalog.append_recipe("Ghost-Zed").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_pictures_preserves_input_order() {
        let fx = fixture();
        fx.store.add_image("old.png", &fx.pictures_root);
        fx.catalog.initialize().await;

        let a = fx.store.add_image("a.png", &fx.pictures_root);
        let b = fx.store.add_image("b.png", &fx.pictures_root);
        fx.catalog.append_pictures(&[a, b]).await.unwrap();

        assert_eq!(
            names(fx.catalog.snapshot(CollectionKind::Pictures).await),
            vec!["a.png", "b.png", "old.png"]
        );
    }

    #[tokio::test]
    async fn test_append_pictures_unknown_id_fails() {
        let fx = fixture();
        fx.catalog.initialize().await;
        let result = fx.catalog.append_pictures(&["nope".to_string()]).await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
        assert_eq!(fx.catalog.len(CollectionKind::Pictures).await, 0);
    }

    #[tokio::test]
    async fn test_find_recipe_not_found() {
        let fx = fixture();
        fx.catalog.initialize().await;
        assert!(matches!(
            fx.catalog.find_recipe("Soup-Ann").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");
        fx.catalog.initialize().await;

        let Items::Recipes(mut copy) = fx.catalog.snapshot(CollectionKind::Recipes).await else {
            panic!("Expected recipes");
        };
        copy.clear();
        assert_eq!(fx.catalog.len(CollectionKind::Recipes).await, 1);
    }

    #[tokio::test]
    async fn test_begin_recipe_rejects_duplicates() {
        let fx = fixture();
        add_recipe(&fx, "Soup-Ann");

        let result = fx.catalog.begin_recipe("Soup-Ann").await;
        assert!(matches!(result, Err(CatalogError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_begin_recipe_creates_folder_and_commits() {
        let fx = fixture();
        fx.catalog.initialize().await;

        let draft = fx.catalog.begin_recipe("Pie-Cy").await.unwrap();
        fx.store
            .upload_file(
                crate::drive::UploadBody::Bytes(crate::drive::fake::png_bytes()),
                "Pie-Cy_1.png",
                "image/png",
                draft.folder_id(),
            )
            .await
            .unwrap();
        let recipe = draft.commit().await.unwrap();

        assert_eq!(recipe.folder_name, "Pie-Cy");
        assert_eq!(recipe.description_images.len(), 1);
        assert!(matches!(
            fx.catalog.begin_recipe("Pie-Cy").await,
            Err(CatalogError::AlreadyExists(_))
        ));
    }

    async fn upload_png(fx: &Fixture, name: &str, folder_id: &str) {
        fx.store
            .upload_file(
                crate::drive::UploadBody::Bytes(crate::drive::fake::png_bytes()),
                name,
                "image/png",
                folder_id,
            )
            .await
            .unwrap();
    }

    async fn folders_named(fx: &Fixture, name: &str) -> usize {
        fx.store
            .list_folders(Some(&fx.recipes_root))
            .await
            .unwrap()
            .iter()
            .filter(|f| f.name == name)
            .count()
    }

    #[tokio::test]
    async fn test_commit_after_abandoned_draft_uses_new_folder() {
        let fx = fixture();
        fx.catalog.initialize().await;

        let abandoned = fx.catalog.begin_recipe("Pie-Cy").await.unwrap();
        drop(abandoned);

        let draft = fx.catalog.begin_recipe("Pie-Cy").await.unwrap();
        upload_png(&fx, "Pie-Cy_1.png", draft.folder_id()).await;
        let recipe = draft.commit().await.unwrap();

        assert_eq!(folders_named(&fx, "Pie-Cy").await, 2);
        assert_eq!(recipe.description_images.len(), 1);
        assert_eq!(recipe.description_images[0].name, "Pie-Cy_1.png");
    }

    #[tokio::test]
    async fn test_begin_recipe_rejects_when_scan_fails() {
        let fx = fixture();
        add_recipe(&fx, "Pie-Cy");

        fx.store.failing.store(true, Ordering::SeqCst);
        let result = fx.catalog.begin_recipe("Pie-Cy").await;
        assert!(matches!(result, Err(CatalogError::RemoteUnavailable(_))));

        fx.store.failing.store(false, Ordering::SeqCst);
        assert_eq!(folders_named(&fx, "Pie-Cy").await, 1);
        assert_eq!(fx.catalog.phase().await, Phase::Empty);
    }

    async fn create_pie(catalog: Arc<Catalog>, store: Arc<FakeStore>) -> CatalogResult<Recipe> {
        let draft = catalog.begin_recipe("Pie-Cy").await?;
        store
            .upload_file(
                crate::drive::UploadBody::Bytes(crate::drive::fake::png_bytes()),
                "Pie-Cy_1.png",
                "image/png",
                draft.folder_id(),
            )
            .await?;
        let recipe = draft.commit().await?;
        Ok(recipe)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_begin_recipe_creates_once() {
        let fx = fixture();
        fx.catalog.initialize().await;

        let (a, b) = tokio::join!(
            tokio::spawn(create_pie(fx.catalog.clone(), fx.store.clone())),
            tokio::spawn(create_pie(fx.catalog.clone(), fx.store.clone())),
        );
        let results = [a.unwrap(), b.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(CatalogError::AlreadyExists(_))))
                .count(),
            1
        );
        assert_eq!(folders_named(&fx, "Pie-Cy").await, 1);
        assert_eq!(fx.catalog.len(CollectionKind::Recipes).await, 1);
    }

    #[tokio::test]
    async fn test_configured_roots_skip_resolution() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FakeStore::new());
        let recipes = store.add_folder("Rezepte", None);
        let pictures = store.add_folder("Bilder", None);
        store.add_image("x.png", &pictures);
        let images = Arc::new(
            ImageCache::with_config(dir.path().to_path_buf(), store.clone(), DEFAULT_THUMBNAIL_SIZE)
                .unwrap(),
        );
        let catalog = Catalog::new(store.clone(), images, Some(recipes), Some(pictures));

        catalog.initialize().await;

        assert_eq!(catalog.len(CollectionKind::Pictures).await, 1);
        assert_eq!(store.folder_listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_root_folder_fails_open() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FakeStore::new());
        let images = Arc::new(
            ImageCache::with_config(dir.path().to_path_buf(), store.clone(), DEFAULT_THUMBNAIL_SIZE)
                .unwrap(),
        );
        let catalog = Catalog::new(store, images, None, None);

        catalog.initialize().await;
        assert_eq!(catalog.phase().await, Phase::Empty);
    }
}
