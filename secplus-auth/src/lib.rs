// Storage primitives shared with the shell
pub mod store;

// Session persistence and install handoff
pub mod bridge;
pub mod device;
pub mod launch;
pub mod session;
pub mod vault;

// Recovery engine
pub mod auth_backend;
pub mod recovery;

pub mod settings;

mod error;

pub use auth_backend::{AuthBackend, HttpAuthBackend};
pub use error::AuthError;
pub use recovery::{AuthEvent, AuthState, Recovery, Trigger, REINSTALL_MESSAGE};
pub use session::SessionPayload;
pub use settings::Settings;
pub use vault::SessionVault;

// Always expose testing module (integration tests need it)
pub mod testing;
