#![allow(missing_docs)]
//! One fetch-and-reconcile cycle.

use std::sync::Arc;

use tracing::info;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::source::PostSource;
use crate::types::ReconcileReport;

/// Pipeline step: fetch qualifying posts, then reconcile the cache with them.
#[derive(Clone)]
pub struct Synchronizer {
    source: Arc<dyn PostSource>,
    cache: Arc<CacheStore>,
}

impl Synchronizer {
    pub fn new(source: Arc<dyn PostSource>, cache: Arc<CacheStore>) -> Self {
        Self { source, cache }
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Returns the source error unchanged when the post list cannot be
    /// fetched; the cache is not touched in that case.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let posts = self.source.fetch_qualifying_posts().await?;
        info!("Fetched {} image posts", posts.len());

        Ok(self.cache.reconcile(&posts, self.source.as_ref()).await)
    }
}
