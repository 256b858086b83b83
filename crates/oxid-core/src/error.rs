//! Framework-level error handling.
//!
//! Protocol rejections (`invalid_request`, `invalid_grant`, ...) are not
//! represented here: handlers report those through the context they are
//! processing and the dispatcher short-circuits. This enum covers the
//! remaining failure classes: configuration mistakes caught at startup,
//! host-integration misuse, persistence failures, and cancellation.

use thiserror::Error;

/// Result type alias using the framework error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Non-protocol errors surfaced by the framework.
#[derive(Debug, Error)]
pub enum Error {
    /// An options invariant was violated. Fatal at initialization.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The host adapter misused the framework (missing transaction
    /// property, missing request object). Fatal and indicates a bug in the
    /// integration, not in the request.
    #[error("host integration error: {0}")]
    Host(String),

    /// A persistence store failed. Mapped to `server_error` at the
    /// protocol boundary; never retried by the core.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A cryptographic operation failed.
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// The operation was canceled through the transaction's cancellation
    /// signal. Distinct from every protocol error.
    #[error("operation canceled")]
    Canceled,
}

impl Error {
    /// Returns whether this error is fatal at initialization time.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Host(_))
    }

    /// Returns whether this error maps to `server_error` on the wire.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Crypto(_))
    }

    /// Returns whether this error represents cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<oxid_crypto::CryptoError> for Error {
    fn from(err: oxid_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_fatal() {
        let error = Error::Configuration("no grant type enabled".to_string());
        assert!(error.is_fatal());
        assert!(!error.is_server_error());
    }

    #[test]
    fn persistence_errors_map_to_server_error() {
        let error = Error::Persistence("store unavailable".to_string());
        assert!(error.is_server_error());
        assert!(!error.is_fatal());
    }

    #[test]
    fn cancellation_is_not_a_protocol_error() {
        let error = Error::Canceled;
        assert!(error.is_canceled());
        assert!(!error.is_server_error());
        assert_eq!(error.to_string(), "operation canceled");
    }
}
