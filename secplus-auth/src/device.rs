use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AuthError;

/// Stable per-install identifier, minted once and kept in a file only the
/// owner can read. The backend uses it to tell installs of the same
/// account apart.
pub struct DeviceIdStore {
    device_id_path: PathBuf,
}

impl DeviceIdStore {
    pub fn new() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("secplus");
        Self::in_dir(&cache_dir)
    }

    pub fn in_dir(dir: &Path) -> Result<Self, AuthError> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            device_id_path: dir.join("device_id"),
        })
    }

    pub fn load_or_create(&self) -> Result<String, AuthError> {
        if self.device_id_path.exists() {
            Ok(fs::read_to_string(&self.device_id_path)?.trim().to_string())
        } else {
            let device_id = Uuid::new_v4().to_string();
            fs::write(&self.device_id_path, &device_id)?;

            // Set permissions to 0600 (owner read/write only)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(&self.device_id_path)?.permissions();
                perms.set_mode(0o600);
                fs::set_permissions(&self.device_id_path, perms)?;
            }

            Ok(device_id)
        }
    }
}

/// What the backend learns about this device when a code is exchanged or
/// a push subscription is registered. Recomputed on demand; describes the
/// environment, never identifies the user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub user_agent: String,
    pub platform: String,
    pub os: String,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    /// Running as the installed app rather than a plain browser tab.
    pub standalone: bool,
    pub mobile: bool,
}

impl DeviceDescriptor {
    pub fn collect(device_id: String) -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH;
        let user_agent = format!(
            "secplus/{} ({} {}) device/{}",
            env!("CARGO_PKG_VERSION"),
            os,
            arch,
            device_id
        );
        Self {
            user_agent,
            platform: format!("{} {}", os, arch),
            mobile: matches!(os.as_str(), "ios" | "android"),
            os,
            locale: std::env::var("LANG").ok().filter(|v| !v.is_empty()),
            timezone: std::env::var("TZ").ok().filter(|v| !v.is_empty()),
            standalone: false,
            device_id,
        }
    }

    pub fn standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    /// JSON attachment sent as `device_info` with exchange requests.
    pub fn device_info(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.user_agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn device_id_is_stable_across_loads() {
        let dir = tempdir().unwrap();
        let store = DeviceIdStore::in_dir(dir.path()).unwrap();
        let first = store.load_or_create().unwrap();
        let second = store.load_or_create().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn user_agent_carries_identity() {
        let descriptor = DeviceDescriptor::collect("dev-1".to_string());
        assert!(descriptor.user_agent.starts_with("secplus/"));
        assert!(descriptor.user_agent.ends_with("device/dev-1"));
    }

    #[test]
    fn device_info_is_a_json_document() {
        let descriptor = DeviceDescriptor::collect("dev-2".to_string()).standalone(true);
        let json: serde_json::Value = serde_json::from_str(&descriptor.device_info()).unwrap();
        assert_eq!(json["device_id"], "dev-2");
        assert_eq!(json["standalone"], true);
        assert!(json["platform"].is_string());
    }
}
