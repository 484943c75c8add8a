use std::sync::Arc;

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use secplus_api::endpoints::install::{CreateInstall, IssuedInstall};
use secplus_api::Client;

use crate::error::AuthError;
use crate::store::{CacheEntry, KvStore, NamedCache, KEY_AUTH_CODE};

/// Named cache the bridge stages codes in.
pub const BRIDGE_CACHE_NAME: &str = "install-bridge";

/// Entry key inside the bridge cache. Part of the handoff contract, since
/// the issuing surface and the installed app address it independently.
pub const BRIDGE_ENTRY_KEY: &str = "/install-code";

/// How long a staged code stays redeemable.
pub const INSTALL_CODE_TTL: Duration = Duration::minutes(30);

/// A code staged for the installed app to pick up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingCode {
    pub code: String,
    #[serde(with = "ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
}

impl PendingCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            issued_at: Utc::now(),
        }
    }
}

/// One-shot handoff of an install code between the issuing surface and
/// the installed app. The code is written to two mediums (the named-cache
/// layer and the replicated store) because either one alone can be wiped
/// during the install transition; reading consumes it from both, so a
/// staged code can never be picked up twice.
pub struct InstallBridge {
    cache: NamedCache,
    store: Arc<KvStore>,
}

impl InstallBridge {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self {
            cache: store.caches().cache(BRIDGE_CACHE_NAME),
            store,
        }
    }

    /// Stage a freshly issued code in both mediums.
    pub fn stash(&self, code: &str) -> Result<(), AuthError> {
        let pending = PendingCode::new(code);
        let body = serde_json::to_vec(&pending)?;
        self.cache.put(BRIDGE_ENTRY_KEY, &CacheEntry::json(body))?;
        self.store.set(KEY_AUTH_CODE, &pending)?;
        Ok(())
    }

    /// Take the staged code if one exists and is younger than `ttl`.
    ///
    /// Whatever was staged is deleted from both mediums the moment it is
    /// read, redeemable or not. A code that fails redemption later must
    /// not still be lying around for another attempt.
    pub fn consume(&self, ttl: Duration) -> Result<Option<String>, AuthError> {
        match self.take_pending()? {
            Some(pending) if Utc::now() - pending.issued_at <= ttl => Ok(Some(pending.code)),
            Some(pending) => {
                info!(
                    age_minutes = (Utc::now() - pending.issued_at).num_minutes(),
                    "discarding expired install code"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Drop any staged code from both mediums.
    pub fn clear(&self) {
        if let Err(e) = self.cache.delete(BRIDGE_ENTRY_KEY) {
            warn!(error = %e, "install bridge cache delete failed");
        }
        self.store.remove(KEY_AUTH_CODE);
    }

    fn take_pending(&self) -> Result<Option<PendingCode>, AuthError> {
        // Cache medium first; the store copy is the fallback for the case
        // where the cache did not survive the install transition.
        let from_cache: Option<PendingCode> = match self.cache.get(BRIDGE_ENTRY_KEY)? {
            Some(entry) => serde_json::from_slice(&entry.body).ok(),
            None => None,
        };
        let from_store: Option<PendingCode> = self.store.get(KEY_AUTH_CODE);
        self.clear();
        Ok(from_cache.or(from_store))
    }
}

/// Ask the backend to mint a code for this install and stage it locally.
/// Used by the setup surface right before handing off to the installed
/// app.
pub async fn prepare_install(
    client: &Client,
    bridge: &InstallBridge,
    request: &CreateInstall,
) -> Result<IssuedInstall, AuthError> {
    let issued = client.create_install(request).await?;
    bridge.stash(&issued.code)?;
    info!(email = %issued.email, "install code staged for handoff");
    Ok(issued)
}
