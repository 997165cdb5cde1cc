//! Channel gallery
//!
//! Mirrors the image posts of a Mattermost channel into a local cache and
//! serves them to a slideshow frontend.
//!
//! A [`SyncDriver`] periodically runs a [`Synchronizer`], which fetches the
//! current image posts from a [`PostSource`] and reconciles the
//! [`CacheStore`] with them. The HTTP router built by
//! [`server::build_router`] reads the same cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use channel_gallery::{
//!     BotSecrets, CacheStore, LocalFileStore, MattermostClient, Settings, Synchronizer,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::load("settings.json")?;
//! let client = Arc::new(MattermostClient::new(&settings, BotSecrets::from_env()?)?);
//! let cache = Arc::new(CacheStore::new(Arc::new(LocalFileStore::new("static/cache"))));
//!
//! let report = Synchronizer::new(client, cache).run().await?;
//! println!("{} new posts cached", report.added);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod storage;
pub mod sync;
pub mod types;

pub use cache::CacheStore;
pub use client::MattermostClient;
pub use config::{BotSecrets, Settings};
pub use error::{GalleryError, Result};
pub use scheduler::{SyncDriver, SyncHandle};
pub use source::PostSource;
pub use storage::{FileStore, LocalFileStore};
pub use sync::Synchronizer;
pub use types::{CacheEntry, EntryMetadata, ImageData, PostRecord, ReconcileReport};
