pub mod endpoints;
mod error;

pub use crate::error::ApiError;

use endpoints::ErrorBody;
use endpoints::install::{
    CreateInstall, CreateInstallRaw, ExchangeGrant, ExchangeInstall, ExchangeInstallRaw,
    IssuedInstall,
};
use endpoints::push::PushSubscriptionUpsert;
use endpoints::session::{RefreshGrant, Session, User, VerifyOtp};
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed client for the auth backend: the generate-link function (install
/// code issuing and redemption), the OTP/refresh session endpoints, and
/// the push-subscription table. One instance per backend project.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl Client {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, ApiError> {
        // A trailing slash keeps Url::join from eating the last path
        // segment of project-scoped base URLs.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url =
            Url::parse(&normalized).map_err(|e| ApiError::BaseUrl(format!("{}: {}", base_url, e)))?;

        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::BaseUrl(format!("{}: {}", path, e)))
    }

    /// Mint a single-use install code for `email`. Pre-install context only.
    pub async fn create_install(&self, req: &CreateInstall) -> Result<IssuedInstall, ApiError> {
        let url = self.endpoint("functions/v1/generate-link")?;
        let resp = self
            .http
            .get(url)
            .query(req)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        let raw: CreateInstallRaw = Self::read_json(resp).await?;
        if !raw.ok {
            return Err(ApiError::Rejected {
                status: StatusCode::BAD_REQUEST.as_u16(),
                message: raw.error.unwrap_or_else(|| "install code not issued".into()),
            });
        }
        match (raw.code, raw.email) {
            (Some(code), Some(email)) => Ok(IssuedInstall { code, email }),
            _ => Err(ApiError::Malformed(
                "create-install response missing code or email".into(),
            )),
        }
    }

    /// Redeem an install code for a one-time login grant. The backend
    /// marks the code used atomically; a second call for the same code is
    /// rejected.
    pub async fn exchange_install(&self, req: &ExchangeInstall) -> Result<ExchangeGrant, ApiError> {
        let url = self.endpoint("functions/v1/generate-link")?;
        let resp = self
            .http
            .get(url)
            .query(req)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        let raw: ExchangeInstallRaw = Self::read_json(resp).await?;
        if !raw.ok {
            return Err(ApiError::Rejected {
                status: StatusCode::BAD_REQUEST.as_u16(),
                message: raw.error.unwrap_or_else(|| "install code rejected".into()),
            });
        }
        match (raw.email, raw.email_otp) {
            (Some(email), Some(email_otp)) => Ok(ExchangeGrant { email, email_otp }),
            _ => Err(ApiError::Malformed(
                "exchange-install response missing email or otp".into(),
            )),
        }
    }

    /// Redeem a one-time login token for a session.
    pub async fn verify_otp(&self, req: &VerifyOtp) -> Result<Session, ApiError> {
        let url = self.endpoint("auth/v1/verify")?;
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(req)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Re-establish a session from a saved refresh credential.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&RefreshGrant {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Probe whether an access credential is still honored by the backend.
    pub async fn get_user(&self, access_token: &str) -> Result<User, ApiError> {
        let url = self.endpoint("auth/v1/user")?;
        let resp = self
            .http
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Revoke the session server-side.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.endpoint("auth/v1/logout")?;
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(Self::rejection(status, &body))
        }
    }

    /// Upsert this device's push subscription row for the logged-in user.
    pub async fn upsert_push_subscription(
        &self,
        access_token: &str,
        sub: &PushSubscriptionUpsert,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("rest/v1/user_push_subscriptions")?;
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Prefer", "resolution=merge-duplicates")
            .bearer_auth(access_token)
            .json(sub)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(Self::rejection(status, &body))
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }
        serde_json::from_str(&body).map_err(ApiError::from)
    }

    fn rejection(status: StatusCode, body: &str) -> ApiError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        ApiError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
