//! Digest helpers and constant-time comparison.

use aws_lc_rs::{constant_time, digest};

/// Computes a SHA-256 digest. Used for PKCE `S256` challenges and
/// symmetric key thumbprints.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Computes a SHA-384 digest.
#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA384, data).as_ref().to_vec()
}

/// Computes a SHA-512 digest.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA512, data).as_ref().to_vec()
}

/// Computes a SHA-1 digest.
///
/// # Warning
///
/// SHA-1 is deprecated for general cryptographic use. This function exists
/// solely to derive X.509 certificate thumbprints, where the thumbprint
/// format is fixed by convention.
#[must_use]
pub fn sha1_thumbprint(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
        .as_ref()
        .to_vec()
}

/// Compares two byte slices in constant time.
///
/// Used for client-secret and code-verifier comparison so that timing does
/// not leak prefix matches.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(a, b).is_ok()
}
