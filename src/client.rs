//! Mattermost client
//!
//! Async client for the Mattermost REST API v4 that implements [`PostSource`].
//! Remote JSON is decoded into typed structs and turned into [`PostRecord`]s
//! at this boundary.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{BotSecrets, Settings};
use crate::error::{GalleryError, Result};
use crate::source::PostSource;
use crate::types::{ImageData, PostRecord};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("channel-gallery/", env!("CARGO_PKG_VERSION"));

/// Account the client is authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotUser {
    /// User id
    pub id: String,
    /// Username
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct Team {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostList {
    #[serde(default)]
    order: Vec<String>,
    #[serde(default)]
    posts: HashMap<String, Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    create_at: i64,
    update_at: i64,
    user_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    file_ids: Vec<String>,
    #[serde(default)]
    metadata: PostMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PostMetadata {
    #[serde(default)]
    files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileInfo {
    id: String,
    #[serde(default)]
    extension: String,
    #[serde(default)]
    mime_type: String,
}

impl FileInfo {
    fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Mattermost API client scoped to one team channel.
pub struct MattermostClient {
    http: Client,
    api_url: String,
    token: String,
    team_name: String,
    channel_name: String,
    max_post_count: u32,
    bot_user: RwLock<Option<BotUser>>,
    file_infos: RwLock<HashMap<String, FileInfo>>,
}

impl MattermostClient {
    /// Create a client for the channel named in `settings`.
    ///
    /// # Errors
    ///
    /// `GalleryError::InvalidUrl` for a malformed instance URL,
    /// `GalleryError::Http` if the HTTP client cannot be built.
    pub fn new(settings: &Settings, secrets: BotSecrets) -> Result<Self> {
        Self::with_timeout(settings, secrets, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        settings: &Settings,
        secrets: BotSecrets,
        timeout: Duration,
    ) -> Result<Self> {
        let base = url::Url::parse(&settings.instance_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_url: format!("{}/api/v4", base.as_str().trim_end_matches('/')),
            token: secrets.token,
            team_name: settings.team_name.clone(),
            channel_name: settings.channel_name.clone(),
            max_post_count: settings.backend.max_post_count,
            bot_user: RwLock::new(None),
            file_infos: RwLock::new(HashMap::new()),
        })
    }

    /// Verify the token and remember the bot account.
    pub async fn connect(&self) -> Result<BotUser> {
        let user: BotUser = self.get_json("users/me").await?;
        info!("Logged in as {}", user.username);
        *self.bot_user.write().await = Some(user.clone());
        Ok(user)
    }

    /// Account the client is logged in as, if any.
    pub async fn bot_user(&self) -> Option<BotUser> {
        self.bot_user.read().await.clone()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.bot_user.read().await.is_none() {
            self.connect().await?;
        }
        Ok(())
    }

    async fn send(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(format!("{}/{}", self.api_url, path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Log in again on the next cycle.
            *self.bot_user.write().await = None;
        }

        let body = response.text().await.unwrap_or_default();
        Err(GalleryError::Api {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                body
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.send(path, &[]).await?.json().await?)
    }

    async fn channel_id(&self) -> Result<String> {
        let team: Team = self
            .get_json(&format!(
                "teams/name/{}",
                urlencoding::encode(&self.team_name)
            ))
            .await?;

        let channel: Channel = self
            .get_json(&format!(
                "teams/{}/channels/name/{}",
                team.id,
                urlencoding::encode(&self.channel_name)
            ))
            .await?;

        Ok(channel.id)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        if let Some(info) = self.file_infos.read().await.get(file_id) {
            return Ok(info.clone());
        }

        let info: FileInfo = self.get_json(&format!("files/{}/info", file_id)).await?;
        self.file_infos
            .write()
            .await
            .insert(file_id.to_string(), info.clone());
        Ok(info)
    }

    async fn username(&self, user_id: &str, known: &mut HashMap<String, String>) -> Result<String> {
        if let Some(name) = known.get(user_id) {
            return Ok(name.clone());
        }

        let user: BotUser = self.get_json(&format!("users/{}", user_id)).await?;
        known.insert(user_id.to_string(), user.username.clone());
        Ok(user.username)
    }

    async fn image_ids(&self, post: &Post) -> Result<Vec<String>> {
        let embedded: HashMap<&str, &FileInfo> = post
            .metadata
            .files
            .iter()
            .map(|info| (info.id.as_str(), info))
            .collect();

        let mut image_ids = Vec::new();
        for file_id in &post.file_ids {
            let info = match embedded.get(file_id.as_str()) {
                Some(info) => {
                    let info = (*info).clone();
                    self.file_infos
                        .write()
                        .await
                        .insert(file_id.clone(), info.clone());
                    info
                }
                None => self.file_info(file_id).await?,
            };

            if info.is_image() {
                image_ids.push(file_id.clone());
            } else {
                debug!("Skipping non-image file {} ({})", file_id, info.mime_type);
            }
        }

        Ok(image_ids)
    }

    async fn fetch_posts(&self) -> Result<Vec<PostRecord>> {
        self.ensure_connected().await?;
        self.file_infos.write().await.clear();

        let channel_id = self.channel_id().await?;
        let mut list: PostList = self
            .send(
                &format!("channels/{}/posts", channel_id),
                &[
                    ("page", "0".to_string()),
                    ("per_page", self.max_post_count.to_string()),
                ],
            )
            .await?
            .json()
            .await?;
        info!("Fetched posts metadata");

        let mut usernames = HashMap::new();
        let mut records = Vec::new();

        // `order` is newest first.
        for post_id in list.order.iter().rev() {
            let Some(post) = list.posts.remove(post_id) else {
                warn!("Post {} listed in order but missing from payload", post_id);
                continue;
            };

            if post.file_ids.is_empty() {
                continue;
            }

            let image_ids = self.image_ids(&post).await?;
            if image_ids.is_empty() {
                continue;
            }

            let username = self.username(&post.user_id, &mut usernames).await?;
            match PostRecord::new(
                post.id,
                post.create_at,
                post.update_at,
                post.user_id,
                username,
                post.message,
                image_ids,
            ) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Dropping post: {}", e),
            }
        }

        Ok(records)
    }

    async fn download(&self, image_id: &str) -> Result<ImageData> {
        let info = self.file_info(image_id).await?;
        let bytes = self
            .send(&format!("files/{}", image_id), &[])
            .await?
            .bytes()
            .await?;

        Ok(ImageData::new(image_id, info.extension, bytes.to_vec()))
    }
}

fn unavailable(err: GalleryError) -> GalleryError {
    match err {
        err @ GalleryError::SourceUnavailable(_) => err,
        other => GalleryError::source_unavailable(other),
    }
}

#[async_trait]
impl PostSource for MattermostClient {
    async fn fetch_qualifying_posts(&self) -> Result<Vec<PostRecord>> {
        self.fetch_posts().await.map_err(unavailable)
    }

    async fn fetch_image(&self, image_id: &str) -> Result<ImageData> {
        self.download(image_id).await.map_err(unavailable)
    }
}
