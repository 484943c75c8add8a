use chrono::{DateTime, Utc, serde::ts_seconds_option};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtp {
    pub email: String,
    pub token: String,
    #[serde(rename = "type")]
    pub otp_type: OtpType,
}

impl VerifyOtp {
    pub fn magiclink(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: token.into(),
            otp_type: OtpType::Magiclink,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpType {
    Magiclink,
    Email,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshGrant {
    pub refresh_token: String,
}

// Responses

/// A session as the auth backend issues it: bearer credentials plus an
/// opaque user record. `expires_at` rides the wire as unix seconds and is
/// absent on some older deployments, which only send `expires_in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default, with = "ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl Session {
    /// Effective expiry: the explicit timestamp when present, otherwise
    /// derived from `expires_in` relative to `issued_at`.
    pub fn expiry_from(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| self.expires_in.map(|s| issued_at + chrono::Duration::seconds(s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_parses_full_shape() {
        let session: Session = serde_json::from_str(
            r#"{
                "access_token": "at-1",
                "token_type": "bearer",
                "expires_in": 3600,
                "expires_at": 1756000000,
                "refresh_token": "rt-1",
                "user": {"id": "u-1", "email": "doc@clinic.example"}
            }"#,
        )
        .unwrap();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.refresh_token, "rt-1");
        assert!(session.expires_at.is_some());
        assert_eq!(session.user.unwrap().id, "u-1");
    }

    #[test]
    fn session_tolerates_minimal_shape() {
        // Older deployments omit expires_at, provider_token and user.
        let session: Session =
            serde_json::from_str(r#"{"access_token":"at","refresh_token":"rt"}"#).unwrap();
        assert!(session.expires_at.is_none());
        assert!(session.user.is_none());
    }

    #[test]
    fn expiry_falls_back_to_expires_in() {
        let session: Session = serde_json::from_str(
            r#"{"access_token":"at","refresh_token":"rt","expires_in":60}"#,
        )
        .unwrap();
        let issued = Utc::now();
        let expiry = session.expiry_from(issued).unwrap();
        assert_eq!(expiry, issued + chrono::Duration::seconds(60));
    }

    #[test]
    fn verify_otp_serializes_type_tag() {
        let req = VerifyOtp::magiclink("doc@clinic.example", "123456");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "magiclink");
        assert_eq!(json["token"], "123456");
    }
}
