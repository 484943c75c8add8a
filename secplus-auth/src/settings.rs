use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::error::AuthError;
use crate::store::Platform;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Base URL of the auth backend project.
    pub backend_url: String,
    /// Publishable key sent with every backend request.
    pub anon_key: String,
    /// Where the replicated store lives. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Origin the offline worker precaches the app shell from.
    #[serde(default)]
    pub app_url: Option<String>,
    /// Start URL this launch was opened with, when the host passes one in.
    /// Carries the install-link query parameters.
    #[serde(default)]
    pub launch_url: Option<String>,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Whether this process runs as the installed app (changes what the
    /// recovery engine reports when nothing is recoverable).
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub platform: Platform,
    /// Push vendor application id; push registration is skipped without it.
    #[serde(default)]
    pub push_app_id: Option<String>,
    /// This device's push player id, once the vendor assigned one.
    #[serde(default)]
    pub push_player_id: Option<String>,
}

fn default_check_interval_secs() -> u64 {
    300
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SECPLUS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("SECPLUS").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backend_url.is_empty() {
            return Err("backend_url is required".to_string());
        }
        if !self.backend_url.starts_with("http") {
            return Err("backend_url must be a valid HTTP(S) URL".to_string());
        }
        if self.anon_key.is_empty() {
            return Err("anon_key is required".to_string());
        }
        if self.check_interval_secs == 0 {
            return Err("check_interval_secs must be greater than zero".to_string());
        }
        if let Some(app_url) = &self.app_url {
            if !app_url.starts_with("http") {
                return Err("app_url must be a valid HTTP(S) URL".to_string());
            }
        }
        Ok(())
    }

    /// Root directory of the replicated store.
    pub fn storage_root(&self) -> Result<PathBuf, AuthError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("secplus"))
            .ok_or_else(|| AuthError::Configuration("Could not find data directory".to_string()))
    }
}
