use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Sender;

pub const DEFAULT_CONFIG_PATH: &str = "config/channel_sync.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Longest side of an uploaded image, in pixels.
    pub max_side_px: u32,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_side_px: 480,
            jpeg_quality: 40,
            max_upload_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity of the current user. Generated on first run when empty.
    pub user_id: String,
    pub display_name: String,
    pub database_path: String,
    pub blob_base_url: String,
    /// Capacity of the queue between the subscription task and the view.
    pub feed_buffer: usize,
    pub image: ImageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            display_name: "Anonymous".to_string(),
            database_path: "data/channel_sync.db".to_string(),
            blob_base_url: "blob://channel-sync".to_string(),
            feed_buffer: 256,
            image: ImageConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn sender(&self) -> Sender {
        Sender::new(self.user_id.clone(), self.display_name.clone())
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

/// Loads the config and makes sure it carries a user id, persisting a freshly
/// generated one.
pub fn load_with_identity(path: &str) -> AppConfig {
    let mut config = load_config(path);
    if config.user_id.trim().is_empty() {
        config.user_id = Uuid::new_v4().to_string();
        if let Err(err) = save_config(path, &config) {
            log::error!("Failed to persist generated user id to {path}: {err}");
        } else {
            log::info!("Generated user id {} and saved it to {path}", config.user_id);
        }
    }
    config
}
