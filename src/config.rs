//! Gallery configuration
//!
//! Settings come from a JSON file read once at startup; bot credentials come
//! from environment variables.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GalleryError, Result};

/// Environment variable holding the bot username
pub const USERNAME_ENV: &str = "MATTERMOST_BOT_USERNAME";
/// Environment variable holding the bot access token
pub const TOKEN_ENV: &str = "MATTERMOST_BOT_TOKEN";

/// Largest page size the Mattermost posts endpoint accepts
pub const MAX_POSTS_PER_PAGE: u32 = 200;

/// Gallery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Team the channel belongs to
    pub team_name: String,

    /// Channel whose image posts are mirrored
    pub channel_name: String,

    /// Base URL of the Mattermost instance, e.g. `https://chat.example.org`
    pub instance_url: String,

    /// Polling settings
    #[serde(default)]
    pub backend: BackendSettings,

    /// Slideshow display timing
    #[serde(default)]
    pub frontend: FrontendSettings,
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Seconds between two synchronization cycles
    pub posts_fetching_interval: u64,

    /// Number of most recent channel posts inspected per cycle
    pub max_post_count: u32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            posts_fetching_interval: 300,
            max_post_count: 100,
        }
    }
}

/// Slideshow display timing, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendSettings {
    /// How often the page reloads the post list
    pub images_fetching_interval: u64,

    /// How long one batch of polaroids stays on screen
    pub polaroid_batch_presentation_duration: u64,
}

impl Default for FrontendSettings {
    fn default() -> Self {
        Self {
            images_fetching_interval: 60,
            polaroid_batch_presentation_duration: 10,
        }
    }
}

impl Settings {
    /// Create settings with required fields only
    pub fn new(
        team_name: impl Into<String>,
        channel_name: impl Into<String>,
        instance_url: impl Into<String>,
    ) -> Self {
        Self {
            team_name: team_name.into(),
            channel_name: channel_name.into(),
            instance_url: instance_url.into(),
            backend: BackendSettings::default(),
            frontend: FrontendSettings::default(),
        }
    }

    /// Load and validate settings from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `GalleryError::Config` if the file cannot be read, is not valid
    /// JSON, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GalleryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate settings from a JSON string
    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(raw)
            .map_err(|e| GalleryError::Config(format!("malformed settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set the polling interval in seconds (builder pattern)
    pub fn with_fetch_interval(mut self, secs: u64) -> Self {
        self.backend.posts_fetching_interval = secs;
        self
    }

    /// Set the number of inspected posts (builder pattern)
    pub fn with_max_post_count(mut self, count: u32) -> Self {
        self.backend.max_post_count = count;
        self
    }

    /// Set the frontend timing in seconds (builder pattern)
    pub fn with_frontend(mut self, images_fetching_interval: u64, batch_duration: u64) -> Self {
        self.frontend = FrontendSettings {
            images_fetching_interval,
            polaroid_batch_presentation_duration: batch_duration,
        };
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.team_name.trim().is_empty() {
            return Err(GalleryError::Config("team_name cannot be empty".to_string()));
        }

        if self.channel_name.trim().is_empty() {
            return Err(GalleryError::Config(
                "channel_name cannot be empty".to_string(),
            ));
        }

        let url = url::Url::parse(&self.instance_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GalleryError::Config(format!(
                "instance_url must be http(s), got {}",
                url.scheme()
            )));
        }

        if self.backend.posts_fetching_interval == 0 {
            return Err(GalleryError::Config(
                "backend.posts_fetching_interval must be positive".to_string(),
            ));
        }

        if self.backend.max_post_count == 0 || self.backend.max_post_count > MAX_POSTS_PER_PAGE {
            return Err(GalleryError::Config(format!(
                "backend.max_post_count must be between 1 and {}, got {}",
                MAX_POSTS_PER_PAGE, self.backend.max_post_count
            )));
        }

        if self.frontend.images_fetching_interval == 0
            || self.frontend.polaroid_batch_presentation_duration == 0
        {
            return Err(GalleryError::Config(
                "frontend timing values must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Interval between two synchronization cycles
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.backend.posts_fetching_interval)
    }

    /// Page reload interval handed to the frontend, in milliseconds
    pub fn images_fetching_interval_ms(&self) -> u64 {
        self.frontend.images_fetching_interval.saturating_mul(1000)
    }

    /// Batch presentation duration handed to the frontend, in milliseconds
    pub fn polaroid_batch_presentation_duration_ms(&self) -> u64 {
        self.frontend
            .polaroid_batch_presentation_duration
            .saturating_mul(1000)
    }
}

/// Bot credentials
#[derive(Clone)]
pub struct BotSecrets {
    /// Bot account username
    pub username: String,
    /// Personal access token of the bot
    pub token: String,
}

impl BotSecrets {
    /// Create secrets programmatically
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Load credentials from environment variables
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// # Errors
    ///
    /// Returns `GalleryError::MissingSetting` if a variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            username: required_env(USERNAME_ENV)?,
            token: required_env(TOKEN_ENV)?,
        })
    }
}

impl fmt::Debug for BotSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotSecrets")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(GalleryError::MissingSetting(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_JSON: &str = r#"{
        "team_name": "ZAM",
        "channel_name": "made-at-zam",
        "instance_url": "https://chat.zam.haus",
        "backend": { "posts_fetching_interval": 120, "max_post_count": 50 },
        "frontend": { "images_fetching_interval": 30, "polaroid_batch_presentation_duration": 8 }
    }"#;

    #[test]
    fn test_settings_from_json() {
        let settings = Settings::from_json(SETTINGS_JSON).unwrap();
        assert_eq!(settings.team_name, "ZAM");
        assert_eq!(settings.channel_name, "made-at-zam");
        assert_eq!(settings.fetch_interval(), Duration::from_secs(120));
        assert_eq!(settings.backend.max_post_count, 50);
        assert_eq!(settings.images_fetching_interval_ms(), 30_000);
        assert_eq!(settings.polaroid_batch_presentation_duration_ms(), 8_000);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_json(
            r#"{"team_name": "t", "channel_name": "c", "instance_url": "http://localhost:8065"}"#,
        )
        .unwrap();
        assert_eq!(settings.backend, BackendSettings::default());
        assert_eq!(settings.frontend, FrontendSettings::default());
    }

    #[test]
    fn test_settings_missing_required_field() {
        let err = Settings::from_json(r#"{"team_name": "t"}"#).unwrap_err();
        assert!(matches!(err, GalleryError::Config(_)));
    }

    #[test]
    fn test_settings_validation() {
        let base = Settings::new("t", "c", "https://chat.example.org");
        assert!(base.validate().is_ok());

        assert!(base.clone().with_fetch_interval(0).validate().is_err());
        assert!(base.clone().with_max_post_count(0).validate().is_err());
        assert!(base.clone().with_max_post_count(201).validate().is_err());
        assert!(base.clone().with_frontend(0, 5).validate().is_err());
        assert!(Settings::new("", "c", "https://x.org").validate().is_err());
        assert!(Settings::new("t", "c", "ftp://x.org").validate().is_err());
        assert!(Settings::new("t", "c", "not a url").validate().is_err());
    }

    #[test]
    fn test_frontend_timing_saturates() {
        let settings = Settings::new("t", "c", "https://chat.example.org")
            .with_frontend(u64::MAX, u64::MAX / 10);
        assert_eq!(settings.images_fetching_interval_ms(), u64::MAX);
        assert_eq!(settings.polaroid_batch_presentation_duration_ms(), u64::MAX);
    }

    #[test]
    fn test_settings_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, SETTINGS_JSON).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.instance_url, "https://chat.zam.haus");

        let err = Settings::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, GalleryError::Config(_)));
    }

    #[test]
    fn test_secrets_debug_redacts_token() {
        let secrets = BotSecrets::new("gallery-bot", "s3cr3t");
        let printed = format!("{:?}", secrets);
        assert!(printed.contains("gallery-bot"));
        assert!(!printed.contains("s3cr3t"));
    }
}
