//! Crate-level error type
//!
//! Each component defines its own error enum next to its implementation;
//! this module aggregates them for callers that drive the whole coordinator
//! (the binary, embedding applications).

use crate::broadcast::HubError;
use crate::experiments::ExperimentError;
use crate::proxy::ProxyError;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for coordinator operations
#[derive(Debug)]
pub enum Error {
    /// Broadcast hub error
    Hub(HubError),
    /// Command proxy error
    Proxy(ProxyError),
    /// Experiment lifecycle error
    Experiment(ExperimentError),
    /// I/O error (listener setup, serving)
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Hub(e) => write!(f, "broadcast hub error: {}", e),
            Error::Proxy(e) => write!(f, "command proxy error: {}", e),
            Error::Experiment(e) => write!(f, "experiment error: {}", e),
            Error::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Hub(e) => Some(e),
            Error::Proxy(e) => Some(e),
            Error::Experiment(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<HubError> for Error {
    fn from(e: HubError) -> Self {
        Error::Hub(e)
    }
}

impl From<ProxyError> for Error {
    fn from(e: ProxyError) -> Self {
        Error::Proxy(e)
    }
}

impl From<ExperimentError> for Error {
    fn from(e: ExperimentError) -> Self {
        Error::Experiment(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
