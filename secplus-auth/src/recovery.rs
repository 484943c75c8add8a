use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::auth_backend::AuthBackend;
use crate::bridge::{InstallBridge, INSTALL_CODE_TTL};
use crate::device::DeviceDescriptor;
use crate::session::SessionPayload;
use crate::store::KvStore;
use crate::vault::SessionVault;

/// Refresh this far ahead of the recorded expiry.
const EXPIRY_BUFFER: Duration = Duration::minutes(5);

/// Attempts per pass when redeeming an install code over a flaky network.
const EXCHANGE_ATTEMPTS: u32 = 3;

/// Shown when a staged install code turns out to be dead. The only way
/// forward is a fresh install link.
pub const REINSTALL_MESSAGE: &str =
    "This install link is no longer valid. Open the latest link from your email or request a new one.";

/// Where the session stands right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No credentials on this device.
    Unauthenticated,
    /// A recovery pass is running.
    Checking,
    /// A live session is persisted.
    Authenticated,
    /// Nothing recoverable locally; the device needs an install link.
    AwaitingInstall,
    /// Recovery gave up. The message says what the user should do.
    Failed { message: String },
}

/// What woke the orchestrator up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Process start.
    Start,
    /// The app came back to the foreground.
    Resume,
    /// Periodic revalidation timer.
    Timer,
    /// The offline worker asked for a session check.
    WorkerPing,
}

/// Notifications pushed to the embedding app.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    StateChanged(AuthState),
    SessionEstablished(SessionPayload),
    SessionLost,
}

/// Silent re-authentication engine. Each trigger runs one recovery pass
/// over the local credential sources in priority order:
///
/// 1. a stored session whose access token still looks live (validated),
/// 2. a refresh with the stored refresh token,
/// 3. a staged single-use install code,
/// 4. nothing; report what the device should do next.
///
/// Passes never overlap. A trigger that arrives while a pass is running
/// is dropped, not queued; the running pass already observes the freshest
/// state there is.
pub struct Recovery<B: AuthBackend> {
    backend: B,
    store: Arc<KvStore>,
    vault: SessionVault,
    bridge: InstallBridge,
    device: DeviceDescriptor,
    installed: bool,
    state: Mutex<AuthState>,
    in_flight: AtomicBool,
    events: UnboundedSender<AuthEvent>,
}

impl<B: AuthBackend> Recovery<B> {
    pub fn new(
        backend: B,
        store: Arc<KvStore>,
        device: DeviceDescriptor,
        installed: bool,
        events: UnboundedSender<AuthEvent>,
    ) -> Self {
        Self {
            backend,
            vault: SessionVault::new(store.clone()),
            bridge: InstallBridge::new(store.clone()),
            store,
            device,
            installed,
            state: Mutex::new(AuthState::Unauthenticated),
            in_flight: AtomicBool::new(false),
            events,
        }
    }

    pub fn state(&self) -> AuthState {
        self.lock_state().clone()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn vault(&self) -> &SessionVault {
        &self.vault
    }

    pub fn bridge(&self) -> &InstallBridge {
        &self.bridge
    }

    /// Entry point for every wake-up source.
    pub async fn trigger(&self, trigger: Trigger) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(?trigger, "recovery pass already running, dropping trigger");
            return;
        }
        info!(?trigger, "recovery pass starting");
        self.run_pass(trigger).await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn run_pass(&self, trigger: Trigger) {
        let was_authenticated = matches!(self.state(), AuthState::Authenticated);
        if !was_authenticated {
            self.set_state(AuthState::Checking);
        }
        if trigger == Trigger::Start {
            // Boot is when layers are most likely to disagree (an update
            // or an OS cleanup may have wiped some of them).
            self.store.reconcile_all();
        }

        // Step 1: a stored session. Validate it if it still looks live,
        // otherwise go straight to refresh.
        if let Some(stored) = self.vault.retrieve() {
            if stored.is_live(EXPIRY_BUFFER) {
                match self.backend.validate(&stored.access_token).await {
                    Ok(()) => {
                        self.establish(stored, "stored session validated");
                        return;
                    }
                    Err(e) if e.is_retryable() => {
                        // Backend unreachable, credentials intact: stay
                        // signed in and let the next trigger re-check.
                        warn!(error = %e, "validation unreachable, keeping stored session");
                        self.establish(stored, "stored session kept while offline");
                        return;
                    }
                    Err(e) => {
                        info!(error = %e, "stored session rejected, trying refresh");
                    }
                }
            }

            // Step 2: refresh with the stored refresh token.
            match self.backend.refresh(&stored.refresh_token).await {
                Ok(fresh) => {
                    self.establish(fresh, "session refreshed");
                    return;
                }
                Err(e) if e.is_retryable() => {
                    if stored.is_live(EXPIRY_BUFFER) {
                        warn!(error = %e, "refresh unreachable, keeping stored session");
                        self.establish(stored, "stored session kept while offline");
                        return;
                    }
                    // Expired access token and no network. The refresh
                    // token stays in the vault for the next pass.
                    warn!(error = %e, "refresh unreachable and session expired");
                }
                Err(e) => {
                    info!(error = %e, "refresh rejected, clearing stored session");
                    self.vault.clear();
                    let _ = self.events.send(AuthEvent::SessionLost);
                }
            }
        } else {
            debug!("no stored session");
        }

        // Step 3: a staged single-use install code.
        match self.bridge.consume(INSTALL_CODE_TTL) {
            Ok(Some(code)) => {
                self.exchange(code).await;
                return;
            }
            Ok(None) => debug!("no pending install code"),
            Err(e) => warn!(error = %e, "install code lookup failed"),
        }

        // Step 4: nothing recoverable on this device.
        if was_authenticated {
            let _ = self.events.send(AuthEvent::SessionLost);
        }
        if self.installed {
            self.set_state(AuthState::Unauthenticated);
        } else {
            self.set_state(AuthState::AwaitingInstall);
        }
    }

    /// Redeem an already-consumed install code, with a bounded number of
    /// attempts when the network is the problem. A definitive rejection
    /// or running out of attempts both end in `Failed`; the code has been
    /// consumed either way, so the device needs a fresh install link.
    async fn exchange(&self, code: String) {
        let device_info = self.device.device_info();
        for attempt in 1..=EXCHANGE_ATTEMPTS {
            match self.backend.exchange_code(&code, &device_info).await {
                Ok(session) => {
                    self.establish(session, "install code redeemed");
                    return;
                }
                Err(e) if e.is_retryable() && attempt < EXCHANGE_ATTEMPTS => {
                    warn!(attempt, error = %e, "code exchange unreachable, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(attempt as u64)).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "code exchange out of attempts");
                    self.fail_install();
                    return;
                }
                Err(e) => {
                    info!(error = %e, "code exchange rejected");
                    self.fail_install();
                    return;
                }
            }
        }
    }

    fn fail_install(&self) {
        // Make sure no copy of the dead code lingers anywhere.
        self.bridge.clear();
        self.set_state(AuthState::Failed {
            message: REINSTALL_MESSAGE.to_string(),
        });
    }

    fn establish(&self, session: SessionPayload, reason: &str) {
        if let Err(e) = self.vault.persist(&session) {
            warn!(error = %e, "session persist failed");
        }
        info!(reason, email = session.user_email().unwrap_or("unknown"), "session established");
        self.set_state(AuthState::Authenticated);
        let _ = self.events.send(AuthEvent::SessionEstablished(session));
    }

    /// Drop the session locally and revoke it server-side, best effort.
    pub async fn sign_out(&self) {
        if let Some(session) = self.vault.retrieve() {
            if let Err(e) = self.backend.sign_out(&session.access_token).await {
                warn!(error = %e, "server-side sign-out failed");
            }
        }
        self.vault.clear();
        self.bridge.clear();
        let _ = self.events.send(AuthEvent::SessionLost);
        self.set_state(AuthState::Unauthenticated);
    }

    fn set_state(&self, next: AuthState) {
        let mut state = self.lock_state();
        if *state == next {
            return;
        }
        debug!(from = ?*state, to = ?next, "auth state change");
        *state = next.clone();
        drop(state);
        let _ = self.events.send(AuthEvent::StateChanged(next));
    }

    fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        // A poisoned lock still holds a valid state value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
