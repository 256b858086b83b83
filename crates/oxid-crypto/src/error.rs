//! Cryptographic error types.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by credential handling and content encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The supplied key material is invalid or does not match the algorithm.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The requested algorithm is not supported.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Content encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Content decryption failed. The message is intentionally generic:
    /// decryption failures must not reveal which part of the token was
    /// malformed.
    #[error("decryption failed")]
    Decryption,
}
