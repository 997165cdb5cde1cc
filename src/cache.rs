#![allow(missing_docs)]
//! Post cache
//!
//! [`CacheStore`] mirrors the latest fetched [`PostRecord`]s into a
//! [`FileStore`]. Each post owns one directory named after its id holding
//! `meta.json`, one file per image and a completion marker written last.
//!
//! `reconcile` and `list` share a single async mutex, so a listing observes
//! the cache either entirely before or entirely after a reconciliation.
//! Entries without a completion marker are treated as stale by `reconcile`
//! and hidden by `list`; an interrupted write is therefore repaired on the
//! next cycle instead of surviving as a permanent cache hit.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GalleryError, Result};
use crate::source::PostSource;
use crate::storage::FileStore;
use crate::types::{
    is_safe_key, CacheEntry, EntryMetadata, PostRecord, ReconcileReport, COMPLETION_MARKER,
    METADATA_FILE,
};

/// State of the entry stored for a post, compared against the fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Missing,
    Stale,
    Fresh,
}

/// Lock-guarded on-disk mirror of the latest fetched posts.
pub struct CacheStore {
    store: Arc<dyn FileStore>,
    lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Bring the cache in line with `fresh`.
    ///
    /// Evicts entries whose post is absent from `fresh`, then creates or fully
    /// replaces the entry of every post that is missing or stale, in order.
    /// Failures are isolated per post and per evicted entry; they end up in the
    /// returned report and the affected posts are retried on the next call.
    pub async fn reconcile(
        &self,
        fresh: &[PostRecord],
        source: &dyn PostSource,
    ) -> ReconcileReport {
        let _guard = self.lock.lock().await;
        let mut report = ReconcileReport::default();

        let fresh_keys: HashSet<&str> = fresh.iter().map(|post| post.post_id.as_str()).collect();
        self.evict_missing(&fresh_keys, &mut report).await;

        for post in fresh {
            if let Err(e) = post.validate() {
                warn!("Ignoring post: {}", e);
                report.rejected.push(post.post_id.clone());
                continue;
            }

            let state = self.entry_state(post).await;
            if state == EntryState::Fresh {
                info!("Cache hit {}", post.post_id);
                report.hits += 1;
                continue;
            }

            match self.write_entry(post, source).await {
                Ok(()) if state == EntryState::Missing => {
                    info!("Created cache entry {}", post.post_id);
                    report.added += 1;
                }
                Ok(()) => {
                    info!("Refreshed cache entry {}", post.post_id);
                    report.refreshed += 1;
                }
                Err(e) => {
                    warn!("Failed to cache post {}: {}", post.post_id, e);
                    if let Err(e) = self.store.remove_dir(&post.post_id).await {
                        warn!("Failed to clean up partial entry {}: {}", post.post_id, e);
                    }
                    report.failed.push(post.post_id.clone());
                }
            }
        }

        info!("Finished caching posts");
        report
    }

    /// All complete entries currently on disk, in directory listing order.
    ///
    /// # Errors
    ///
    /// Only if the cache root cannot be enumerated. Unreadable entries are
    /// skipped.
    pub async fn list(&self) -> Result<Vec<CacheEntry>> {
        let _guard = self.lock.lock().await;

        let mut entries = Vec::new();
        for post_id in self.store.list_dirs().await? {
            match self.load_entry(&post_id).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => debug!("Skipping incomplete cache entry {}", post_id),
                Err(e) => warn!("Skipping unreadable cache entry {}: {}", post_id, e),
            }
        }

        Ok(entries)
    }

    async fn evict_missing(&self, fresh_keys: &HashSet<&str>, report: &mut ReconcileReport) {
        let existing = match self.store.list_dirs().await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Cannot enumerate cache entries, skipping eviction: {}", e);
                return;
            }
        };

        for key in existing {
            if fresh_keys.contains(key.as_str()) {
                continue;
            }

            match self.store.remove_dir(&key).await {
                Ok(()) => {
                    info!("Removed cache entry {}", key);
                    report.evicted += 1;
                }
                Err(e) => {
                    warn!("Failed to remove cache entry {}: {}", key, e);
                    report.eviction_failures.push(key);
                }
            }
        }
    }

    async fn entry_state(&self, post: &PostRecord) -> EntryState {
        let key = post.post_id.as_str();

        match self.store.exists(key, COMPLETION_MARKER).await {
            Ok(true) => {}
            Ok(false) => {
                return match self.store.exists(key, METADATA_FILE).await {
                    Ok(false) => EntryState::Missing,
                    _ => EntryState::Stale,
                }
            }
            Err(e) => {
                warn!("Cannot inspect cache entry {}: {}", key, e);
                return EntryState::Stale;
            }
        }

        match self.read_metadata(key).await {
            Ok(metadata) if metadata.update_at == post.update_at => EntryState::Fresh,
            Ok(_) => EntryState::Stale,
            Err(e) => {
                warn!("Unreadable metadata for {}: {}", key, e);
                EntryState::Stale
            }
        }
    }

    async fn write_entry(&self, post: &PostRecord, source: &dyn PostSource) -> Result<()> {
        let key = post.post_id.as_str();

        // Full replace: files of a previous version must not linger.
        self.store.remove_dir(key).await?;

        self.store
            .write(key, METADATA_FILE, &post.metadata().to_json()?)
            .await?;

        for image_id in &post.image_ids {
            let image = source.fetch_image(image_id).await?;
            let file_name = image.file_name();
            if !is_safe_key(&file_name) || is_reserved_name(&file_name) {
                return Err(GalleryError::InvalidPost(format!(
                    "image file name {:?} of post {} is not storable",
                    file_name, key
                )));
            }

            self.store.write(key, &file_name, &image.bytes).await?;
            info!("\tFetched {}", file_name);
        }

        self.store.write(key, COMPLETION_MARKER, &[]).await
    }

    async fn read_metadata(&self, key: &str) -> Result<EntryMetadata> {
        let bytes = self.store.read(key, METADATA_FILE).await?;
        EntryMetadata::from_json(&bytes)
    }

    async fn load_entry(&self, post_id: &str) -> Result<Option<CacheEntry>> {
        if !self.store.exists(post_id, COMPLETION_MARKER).await? {
            return Ok(None);
        }

        let metadata = self.read_metadata(post_id).await?;
        let images = self
            .store
            .list_files(post_id)
            .await?
            .into_iter()
            .filter(|name| !is_reserved_name(name))
            .collect();

        Ok(Some(CacheEntry {
            post_id: post_id.to_string(),
            metadata,
            images,
        }))
    }
}

/// Metadata, marker and hidden temporary files are not images.
pub(crate) fn is_reserved_name(name: &str) -> bool {
    name == METADATA_FILE || name.starts_with('.')
}
