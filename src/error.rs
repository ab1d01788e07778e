//! Error types for as-proxy

use std::time::Duration;
use thiserror::Error;

/// ProxyError covers everything the library can fail with, from loading
/// the configuration to moving bytes between a client and the backend
#[derive(Error, Debug)]
pub enum ProxyError {
    /// I/O error (network, file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A cluster address pattern that does not compile
    #[error("invalid cluster address pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Password hashing failed at startup
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// The backend refused or failed the connection
    #[error("error dialing {addr:?}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend did not answer within the dial timeout
    #[error("timed out dialing {addr:?} after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },
}

/// Result type alias for ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::Config(err.to_string())
    }
}
