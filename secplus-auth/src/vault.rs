use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::AuthError;
use crate::session::SessionPayload;
use crate::store::{KvStore, KEY_LAST_SYNC, KEY_SESSION, KEY_USER_DATA};

/// Persists the session credential set across restarts. Everything goes
/// through the multi-layer store, so a surviving copy in any layer is
/// enough to come back from.
pub struct SessionVault {
    store: Arc<KvStore>,
}

impl SessionVault {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    /// Store the session everywhere. A payload missing either token is
    /// skipped; persisting it would only produce a session that cannot be
    /// refreshed later.
    pub fn persist(&self, session: &SessionPayload) -> Result<(), AuthError> {
        if !session.is_complete() {
            debug!("session missing credentials, skipping persist");
            return Ok(());
        }
        self.store.set(KEY_SESSION, session)?;
        self.store.set(KEY_LAST_SYNC, &Utc::now().timestamp_millis())?;
        if let Some(user) = &session.user {
            self.store.set(KEY_USER_DATA, user)?;
        }
        Ok(())
    }

    /// The stored session, if any layer still has a complete one.
    pub fn retrieve(&self) -> Option<SessionPayload> {
        let session: SessionPayload = self.store.get(KEY_SESSION)?;
        if session.is_complete() {
            Some(session)
        } else {
            debug!("stored session is missing credentials, treating as absent");
            None
        }
    }

    pub fn persist_user(&self, user: &serde_json::Value) -> Result<(), AuthError> {
        self.store.set(KEY_USER_DATA, user)
    }

    pub fn retrieve_user(&self) -> Option<serde_json::Value> {
        self.store.get(KEY_USER_DATA)
    }

    /// When a session was last persisted on this device.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.store.get(KEY_LAST_SYNC)?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Forget the session and everything derived from it, in every layer.
    pub fn clear(&self) {
        self.store.remove(KEY_SESSION);
        self.store.remove(KEY_USER_DATA);
        self.store.remove(KEY_LAST_SYNC);
    }
}
