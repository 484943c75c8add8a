use secplus_api::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid app origin: {0}")]
    Origin(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Essential asset failed to install: {0}")]
    Install(String),

    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push permission denied")]
    PermissionDenied,

    #[error("Push vendor never assigned a subscription id")]
    NeverReady,

    #[error("No signed-in user to attach the subscription to")]
    NoUser,

    #[error("Push vendor error: {0}")]
    Vendor(String),

    #[error("Backend rejected the push subscription: {0}")]
    Backend(#[from] ApiError),
}
