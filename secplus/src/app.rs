use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use secplus_api::Client;
use secplus_auth::bridge::{prepare_install, InstallBridge};
use secplus_auth::device::{DeviceDescriptor, DeviceIdStore};
use secplus_auth::launch::LaunchQuery;
use secplus_auth::recovery::{AuthEvent, AuthState, Recovery, Trigger};
use secplus_auth::store::{CacheSet, KvStore};
use secplus_auth::{HttpAuthBackend, Settings};

use crate::error::WorkerError;
use crate::offline::{HttpFetch, Worker};
use crate::push::{ApiSink, ConfiguredPlatform, PushAgent};

type ShellPushAgent = PushAgent<ConfiguredPlatform, ApiSink>;

/// Wires settings, the replicated store, the recovery engine, the offline
/// worker and push registration together, then runs the trigger loop until
/// shutdown.
pub struct Shell {
    settings: Settings,
}

impl Shell {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub async fn run(&self) -> Result<()> {
        self.settings.validate().map_err(anyhow::Error::msg)?;

        let root = self.settings.storage_root()?;
        let store = Arc::new(KvStore::open(&root, self.settings.platform)?);
        info!(root = %root.display(), platform = self.settings.platform.as_str(), "store open");

        let device_id = DeviceIdStore::new()?.load_or_create()?;
        let device = DeviceDescriptor::collect(device_id).standalone(self.settings.installed);

        let client = Client::new(&self.settings.backend_url, &self.settings.anon_key)?;
        let backend = HttpAuthBackend::new(client);

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let recovery = Arc::new(Recovery::new(
            backend,
            store.clone(),
            device.clone(),
            self.settings.installed,
            events_tx,
        ));

        let push = self.push_agent(&device)?;

        // An install link opened this launch; stage what it carries before
        // recovery runs its pass.
        self.stage_launch(&store).await?;

        info!("starting session recovery");
        recovery.trigger(Trigger::Start).await;

        // The worker is best effort: a dead app origin means no offline
        // copy, not a broken session stack. Once it is active it asks for
        // a session check of its own.
        if let Some(app_url) = &self.settings.app_url {
            match self.start_worker(store.caches(), app_url).await {
                Ok(()) => {
                    info!("offline worker active");
                    recovery.trigger(Trigger::WorkerPing).await;
                }
                Err(e) => warn!(error = %e, "offline worker unavailable, continuing without it"),
            }
        }

        let ticker = {
            let recovery = recovery.clone();
            let period = Duration::from_secs(self.settings.check_interval_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                // The first tick fires immediately; Start already covered it.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    recovery.trigger(Trigger::Timer).await;
                }
            })
        };

        // The host signals a return to the foreground with SIGUSR1, which
        // re-enters validation the same way a visibility change would.
        let resume = {
            let recovery = recovery.clone();
            tokio::spawn(async move {
                let mut foreground = match signal(SignalKind::user_defined1()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!(error = %e, "resume signal unavailable");
                        return;
                    }
                };
                while foreground.recv().await.is_some() {
                    recovery.trigger(Trigger::Resume).await;
                }
            })
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
                Some(event) = events.recv() => {
                    self.on_event(event, push.as_ref()).await;
                }
            }
        }

        ticker.abort();
        resume.abort();
        Ok(())
    }

    async fn on_event(&self, event: AuthEvent, push: Option<&ShellPushAgent>) {
        match event {
            AuthEvent::StateChanged(AuthState::Failed { message }) => {
                error!(%message, "session recovery failed");
            }
            AuthEvent::StateChanged(state) => {
                info!(state = ?state, "auth state");
            }
            AuthEvent::SessionEstablished(session) => {
                info!(
                    email = session.user_email().unwrap_or("unknown"),
                    "session established"
                );
                if let Some(agent) = push {
                    // Contained by design of the agent: a push failure is
                    // logged here and the session stands either way.
                    if let Err(e) = agent.register_device(&session).await {
                        warn!(error = %e, "push registration failed");
                    }
                }
            }
            AuthEvent::SessionLost => {
                warn!("session lost, next trigger re-enters recovery");
            }
        }
    }

    async fn stage_launch(&self, store: &Arc<KvStore>) -> Result<()> {
        let Some(launch_url) = &self.settings.launch_url else {
            return Ok(());
        };
        let query = match LaunchQuery::parse(launch_url) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable launch url");
                return Ok(());
            }
        };

        let bridge = InstallBridge::new(store.clone());
        if let Some(code) = &query.code {
            // A code pinned to the launch link outranks anything staged
            // earlier.
            bridge.stash(code)?;
            info!("install code staged from launch url");
        } else if let Some(request) = query.to_create_install() {
            let client = Client::new(&self.settings.backend_url, &self.settings.anon_key)?;
            match prepare_install(&client, &bridge, &request).await {
                Ok(issued) => info!(email = %issued.email, "install code minted and staged"),
                Err(e) => warn!(error = %e, "install preparation failed"),
            }
        }
        Ok(())
    }

    async fn start_worker(&self, caches: CacheSet, app_url: &str) -> Result<(), WorkerError> {
        let mut worker = Worker::new(caches, HttpFetch::new()?, app_url)?;
        worker.install().await?;
        worker.activate().await?;
        Ok(())
    }

    fn push_agent(&self, device: &DeviceDescriptor) -> Result<Option<ShellPushAgent>> {
        if self.settings.push_app_id.is_none() {
            info!("no push app id configured, skipping push registration");
            return Ok(None);
        }
        let client = Client::new(&self.settings.backend_url, &self.settings.anon_key)?;
        Ok(Some(PushAgent::new(
            ConfiguredPlatform::new(self.settings.push_player_id.clone()),
            ApiSink::new(client),
            device.clone(),
            self.settings.platform,
        )))
    }
}
