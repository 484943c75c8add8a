use serde::{Deserialize, Serialize};

/// Row upserted into the backend's push-subscription table once the push
/// vendor has assigned a subscription identifier to this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscriptionUpsert {
    pub onesignal_player_id: String,
    pub user_id: String,
    pub platform: String,
    pub device_os: String,
    pub browser: String,
}

impl PushSubscriptionUpsert {
    pub fn new(
        player_id: impl Into<String>,
        user_id: impl Into<String>,
        platform: impl Into<String>,
        device_os: impl Into<String>,
        browser: impl Into<String>,
    ) -> Self {
        Self {
            onesignal_player_id: player_id.into(),
            user_id: user_id.into(),
            platform: platform.into(),
            device_os: device_os.into(),
            browser: browser.into(),
        }
    }
}
