// Shell wiring
pub mod app;
pub mod logging;

// Offline worker and push registration
pub mod offline;
pub mod push;

mod error;

pub use app::Shell;
pub use error::{PushError, WorkerError};

// Always expose testing module (integration tests need it)
pub mod testing;
