//! # oxid-crypto
//!
//! Cryptographic building blocks for the oxid authorization server
//! framework:
//!
//! - [`SigningCredential`] / [`EncryptionCredential`] descriptors combining
//!   key material, optional X.509 metadata, and derived key identifiers
//! - Key-id derivation and credential precedence sorting
//! - Compact JWE content encryption (`dir` + `A256GCM`) for access and
//!   refresh token payloads
//! - Secure random generation for codes, handles, and secrets
//!
//! Key material provisioning (reading keys from disk, HSMs, or certificate
//! stores) is the host's concern; this crate only consumes the material it
//! is handed.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod credential;
pub mod error;
pub mod hash;
pub mod jwe;
pub mod random;

pub use algorithm::SigningAlgorithm;
pub use credential::{
    sort_signing_credentials, EcCurve, EncryptionCredential, KeyMaterial, SigningCredential,
    X509Metadata,
};
pub use error::{CryptoError, CryptoResult};
