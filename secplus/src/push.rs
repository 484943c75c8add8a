use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use secplus_api::endpoints::push::PushSubscriptionUpsert;
use secplus_api::Client;
use secplus_auth::device::DeviceDescriptor;
use secplus_auth::store::Platform;
use secplus_auth::SessionPayload;

use crate::error::PushError;

/// How often the readiness poll re-probes the vendor for a subscription id.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for the vendor before giving up. Registration is
/// retried on the next session event, so giving up here costs nothing
/// permanent.
pub const POLL_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Undecided,
}

/// The slice of the push vendor's SDK this app depends on. The vendor's
/// shifting fallback chains stay behind this seam.
pub trait PushPlatform: Send + Sync {
    fn permission(&self) -> impl Future<Output = Permission> + Send;

    fn request_permission(&self) -> impl Future<Output = Result<Permission, PushError>> + Send;

    fn opt_in(&self) -> impl Future<Output = Result<(), PushError>> + Send;

    /// The vendor-assigned subscription id, once one exists. Assignment
    /// happens asynchronously on the vendor side, hence the readiness poll.
    fn subscription_id(&self) -> impl Future<Output = Option<String>> + Send;
}

/// Probe repeatedly until `probe` yields a value or `deadline` elapses.
/// Always resolves to a definite answer; never loops unbounded.
pub async fn poll_until<T, F, Fut>(interval: Duration, deadline: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if started.elapsed() + interval >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Where a completed subscription gets recorded.
pub trait SubscriptionSink: Send + Sync {
    fn register(
        &self,
        access_token: &str,
        row: &PushSubscriptionUpsert,
    ) -> impl Future<Output = Result<(), PushError>> + Send;
}

/// Production sink: the backend's push-subscription table.
pub struct ApiSink {
    client: Client,
}

impl ApiSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl SubscriptionSink for ApiSink {
    async fn register(
        &self,
        access_token: &str,
        row: &PushSubscriptionUpsert,
    ) -> Result<(), PushError> {
        self.client.upsert_push_subscription(access_token, row).await?;
        Ok(())
    }
}

/// Vendor adapter fed from configuration. The real SDK runs outside this
/// process; once it has assigned a subscription id, that id reaches us
/// through settings.
pub struct ConfiguredPlatform {
    subscription_id: Option<String>,
}

impl ConfiguredPlatform {
    pub fn new(subscription_id: Option<String>) -> Self {
        Self { subscription_id }
    }
}

impl PushPlatform for ConfiguredPlatform {
    async fn permission(&self) -> Permission {
        if self.subscription_id.is_some() {
            Permission::Granted
        } else {
            Permission::Undecided
        }
    }

    async fn request_permission(&self) -> Result<Permission, PushError> {
        // Nothing to prompt with; without a configured id the answer is no.
        Ok(if self.subscription_id.is_some() {
            Permission::Granted
        } else {
            Permission::Denied
        })
    }

    async fn opt_in(&self) -> Result<(), PushError> {
        if self.subscription_id.is_none() {
            return Err(PushError::Vendor(
                "no subscription id provisioned for this device".to_string(),
            ));
        }
        Ok(())
    }

    async fn subscription_id(&self) -> Option<String> {
        self.subscription_id.clone()
    }
}

/// Registers this device for push under the signed-in user. Every failure
/// is returned to the caller and goes no further; push trouble must never
/// unsettle the session.
pub struct PushAgent<P: PushPlatform, S: SubscriptionSink> {
    platform: P,
    sink: S,
    device: DeviceDescriptor,
    store_platform: Platform,
}

impl<P: PushPlatform, S: SubscriptionSink> PushAgent<P, S> {
    pub fn new(platform: P, sink: S, device: DeviceDescriptor, store_platform: Platform) -> Self {
        Self {
            platform,
            sink,
            device,
            store_platform,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn register_device(&self, session: &SessionPayload) -> Result<String, PushError> {
        let user_id = session.user_id().ok_or(PushError::NoUser)?;

        let permission = match self.platform.permission().await {
            Permission::Undecided => self.platform.request_permission().await?,
            known => known,
        };
        if permission == Permission::Denied {
            return Err(PushError::PermissionDenied);
        }

        self.platform.opt_in().await?;

        let player_id = poll_until(POLL_INTERVAL, POLL_DEADLINE, || {
            self.platform.subscription_id()
        })
        .await
        .ok_or(PushError::NeverReady)?;

        let row = PushSubscriptionUpsert::new(
            player_id.as_str(),
            user_id,
            self.store_platform.as_str(),
            self.device.os.as_str(),
            "app",
        );
        self.sink.register(&session.access_token, &row).await?;
        info!(player_id = %player_id, "push subscription registered");
        Ok(player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn poll_until_reports_ready() {
        let probes = AtomicU32::new(0);
        let found = poll_until(Duration::from_millis(10), Duration::from_secs(1), || {
            let n = probes.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (n >= 3).then_some(n) }
        })
        .await;
        assert_eq!(found, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_gives_up_at_the_deadline() {
        let probes = AtomicU32::new(0);
        let found: Option<u32> = poll_until(Duration::from_millis(100), Duration::from_secs(1), || {
            probes.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;
        assert_eq!(found, None);
        // One initial probe plus one per interval inside the deadline.
        assert_eq!(probes.load(Ordering::SeqCst), 10);
    }
}
