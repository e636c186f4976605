//! Isolated environment for end-to-end generation tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use citybingo::db::{artifact_repo, Database};
use citybingo::persistence::{ReferenceStore, SqliteReferenceStore};
use citybingo::{Config, CoreServices, ImageGenerator};

use super::fakes::FlakyStore;

pub struct TestHarness {
    temp_dir: TempDir,
    pub primary_dir: PathBuf,
    pub fallback_dir: PathBuf,
    pub db: Database,
    pub core: CoreServices,
}

impl TestHarness {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self::with_config(generator, |_| {})
    }

    pub fn with_config<F>(generator: Arc<dyn ImageGenerator>, configure: F) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let primary_dir = temp_dir.path().join("public").join("images");
        let fallback_dir = temp_dir.path().join("tmp").join("images");
        Self::build(temp_dir, primary_dir, fallback_dir, generator, configure, None)
    }

    /// The full stack, with a backing store that silently drops the first
    /// `drop_writes` writes underneath the read cache.
    pub fn with_dropped_writes(
        generator: Arc<dyn ImageGenerator>,
        drop_writes: usize,
    ) -> (Self, Arc<FlakyStore>) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let primary_dir = temp_dir.path().join("public").join("images");
        let fallback_dir = temp_dir.path().join("tmp").join("images");
        let db = Database::open_in_memory().expect("Failed to open database");
        let store = Arc::new(FlakyStore::new(
            SqliteReferenceStore::new(db.clone()),
            drop_writes,
        ));
        let harness = Self::build_on(
            temp_dir,
            primary_dir,
            fallback_dir,
            db,
            generator,
            |_| {},
            Some(store.clone() as Arc<dyn ReferenceStore>),
        );
        (harness, store)
    }

    /// A harness whose primary directory sits below a regular file, so it
    /// can never be created.
    pub fn with_blocked_primary(generator: Arc<dyn ImageGenerator>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blocker = temp_dir.path().join("read-only");
        std::fs::write(&blocker, b"not a directory").expect("Failed to write blocker file");
        let primary_dir = blocker.join("images");
        let fallback_dir = temp_dir.path().join("tmp").join("images");
        Self::build(temp_dir, primary_dir, fallback_dir, generator, |_| {}, None)
    }

    fn build<F>(
        temp_dir: TempDir,
        primary_dir: PathBuf,
        fallback_dir: PathBuf,
        generator: Arc<dyn ImageGenerator>,
        configure: F,
        backing: Option<Arc<dyn ReferenceStore>>,
    ) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let db = Database::open_in_memory().expect("Failed to open database");
        Self::build_on(
            temp_dir,
            primary_dir,
            fallback_dir,
            db,
            generator,
            configure,
            backing,
        )
    }

    fn build_on<F>(
        temp_dir: TempDir,
        primary_dir: PathBuf,
        fallback_dir: PathBuf,
        db: Database,
        generator: Arc<dyn ImageGenerator>,
        configure: F,
        backing: Option<Arc<dyn ReferenceStore>>,
    ) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let mut config = Config::default();
        config.storage.primary_directory = primary_dir.display().to_string();
        config.storage.fallback_directory = Some(fallback_dir.display().to_string());
        configure(&mut config);

        let core = match backing {
            Some(backing) => {
                CoreServices::assemble_with_backing_store(config, db.clone(), generator, backing)
            }
            None => CoreServices::assemble(config, db.clone(), generator),
        }
        .expect("Failed to assemble core services");

        Self {
            temp_dir,
            primary_dir,
            fallback_dir,
            db,
            core,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Visible files in the active storage root.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let dir = self.core.assets.root().directory();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| !n.starts_with('.'))
                    })
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    /// The persisted reference for an item, read straight from the database.
    pub fn persisted_image(&self, city_id: &str, item_id: &str) -> Option<String> {
        artifact_repo::read_image(&self.db, city_id, item_id).expect("Failed to read image")
    }

    pub fn seed_item(&self, city_id: &str, item_id: &str, item_text: &str) {
        artifact_repo::upsert_item_text(&self.db, city_id, item_id, item_text)
            .expect("Failed to seed item");
    }
}
