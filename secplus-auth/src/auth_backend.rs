use std::future::Future;

use secplus_api::endpoints::install::ExchangeInstall;
use secplus_api::endpoints::session::VerifyOtp;
use secplus_api::Client;

use crate::error::AuthError;
use crate::session::SessionPayload;

/// The backend operations recovery needs. Implemented over HTTP in
/// production and scripted in tests.
pub trait AuthBackend: Send + Sync {
    /// Check that an access token is still honored.
    fn validate(&self, access_token: &str)
        -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Trade a refresh token for a fresh session.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<SessionPayload, AuthError>> + Send;

    /// Redeem a single-use install code for a session.
    fn exchange_code(
        &self,
        code: &str,
        device_info: &str,
    ) -> impl Future<Output = Result<SessionPayload, AuthError>> + Send;

    /// Revoke the session server-side.
    fn sign_out(&self, access_token: &str)
        -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// Production backend speaking to the real auth service.
pub struct HttpAuthBackend {
    client: Client,
}

impl HttpAuthBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl AuthBackend for HttpAuthBackend {
    async fn validate(&self, access_token: &str) -> Result<(), AuthError> {
        self.client.get_user(access_token).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionPayload, AuthError> {
        let session = self.client.refresh_session(refresh_token).await?;
        Ok(session.into())
    }

    async fn exchange_code(&self, code: &str, device_info: &str) -> Result<SessionPayload, AuthError> {
        // Two hops: the code buys a one-time login token, the token buys
        // the session.
        let request = ExchangeInstall::new(code).device_info(device_info);
        let grant = self.client.exchange_install(&request).await?;
        let verify = VerifyOtp::magiclink(grant.email, grant.email_otp);
        let session = self.client.verify_otp(&verify).await?;
        Ok(session.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.client.sign_out(access_token).await?;
        Ok(())
    }
}
