//! Metadata Cache Implementation
//!
//! Memoizes Drive file records by id using Moka. Drive file metadata never
//! changes for the files this service tracks, so a TTL is only there to bound
//! memory and pick up renames eventually.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::drive::DriveFile;

/// Default TTL for file records
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Upper bound on cached records
const MAX_ENTRIES: u64 = 10_000;

pub struct MetadataCache {
    /// File records by Drive id
    files: Cache<String, DriveFile>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let files = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(MAX_ENTRIES)
            .name("drive_file_cache")
            .build();

        Self {
            files,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a file record, updating hit/miss counters
    pub fn get(&self, id: &str) -> Option<DriveFile> {
        match self.files.get(id) {
            Some(file) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = id, "Cache HIT for file metadata");
                Some(file)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = id, "Cache MISS for file metadata");
                None
            }
        }
    }

    pub fn insert(&self, file: DriveFile) {
        debug!(file_id = %file.id, name = %file.name, "Cached file metadata");
        self.files.insert(file.id.clone(), file);
    }

    /// Returns (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
