use chrono::serde::ts_seconds_option;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The credential set persisted across restarts: what OTP redemption or a
/// refresh hands back, trimmed to what re-authentication needs. The user
/// record rides along as opaque JSON so backend additions survive a
/// round-trip through storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionPayload {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, with = "ts_seconds_option", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl SessionPayload {
    /// Both tokens present. Anything less is unusable for silent
    /// re-authentication and gets treated as absent by the vault.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// Whether the access token is still usable, with `buffer` subtracted
    /// so callers refresh slightly early. No recorded expiry means live.
    pub fn is_live(&self, buffer: Duration) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + buffer < at,
            None => true,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref()?.get("id")?.as_str()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user.as_ref()?.get("email")?.as_str()
    }
}

impl From<secplus_api::endpoints::session::Session> for SessionPayload {
    fn from(session: secplus_api::endpoints::session::Session) -> Self {
        let expires_at = session.expiry_from(Utc::now());
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at,
            token_type: session.token_type,
            provider_token: session.provider_token,
            user: session.user.and_then(|u| serde_json::to_value(u).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> SessionPayload {
        SessionPayload {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            token_type: Some("bearer".into()),
            provider_token: None,
            user: Some(json!({"id": "u-1", "email": "doc@clinic.example"})),
        }
    }

    #[test]
    fn completeness_requires_both_tokens() {
        assert!(payload().is_complete());

        let mut missing_refresh = payload();
        missing_refresh.refresh_token.clear();
        assert!(!missing_refresh.is_complete());

        let mut missing_access = payload();
        missing_access.access_token = String::new();
        assert!(!missing_access.is_complete());
    }

    #[test]
    fn liveness_honors_buffer() {
        let mut session = payload();
        session.expires_at = Some(Utc::now() + Duration::minutes(3));
        assert!(session.is_live(Duration::zero()));
        assert!(!session.is_live(Duration::minutes(5)));

        session.expires_at = None;
        assert!(session.is_live(Duration::minutes(5)));
    }

    #[test]
    fn user_fields_read_from_opaque_record() {
        let session = payload();
        assert_eq!(session.user_id(), Some("u-1"));
        assert_eq!(session.user_email(), Some("doc@clinic.example"));

        let mut anonymous = payload();
        anonymous.user = None;
        assert_eq!(anonymous.user_id(), None);
    }

    #[test]
    fn expiry_serializes_as_unix_seconds() {
        let session = payload();
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["expires_at"].is_i64());

        let back: SessionPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.access_token, "at-1");
        // Sub-second precision is lost on the wire, so compare seconds.
        assert_eq!(
            back.expires_at.map(|t| t.timestamp()),
            session.expires_at.map(|t| t.timestamp())
        );
    }
}
