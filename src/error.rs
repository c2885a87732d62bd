//! Error types for process startup and shutdown.
//!
//! Request-level failures never surface here: the webhook path converts
//! them into admission responses (see [`crate::webhooks::codec`]).

use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Error type for startup and the run group
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS material could not be loaded
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Listener bind or accept failure
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    /// A run group task exited with an error
    #[error(transparent)]
    Task(#[from] LifecycleError),

    /// Logger could not be installed
    #[error("Logging setup error: {0}")]
    Subscriber(String),
}

impl Error {
    /// Whether this error happened before any traffic could be served
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Tls(_) | Error::Serve(_) | Error::Subscriber(_)
        )
    }
}

/// Result type alias for startup operations
pub type Result<T> = std::result::Result<T, Error>;
