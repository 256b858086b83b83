//! Cryptographically secure random generation.
//!
//! Provides the random artifacts the protocol engine mints:
//! - reference token handles
//! - request-cache identifiers
//! - device user codes
//! - client secrets

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Alphabet for user codes: uppercase letters and digits with the
/// ambiguous characters (I, O, 0, 1) removed.
const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random alphanumeric string of the given length.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a URL-safe base64-encoded random string.
#[must_use]
pub fn random_base64url(byte_len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(byte_len))
}

/// Generates a reference token handle.
///
/// 256 bits of entropy, base64url-encoded, suitable for use as an opaque
/// wire token whose payload is kept server-side.
#[must_use]
pub fn generate_reference_id() -> String {
    random_base64url(32)
}

/// Generates a request-cache identifier for pushed authorization
/// parameters.
#[must_use]
pub fn generate_request_id() -> String {
    random_base64url(16)
}

/// Generates a client secret for confidential clients.
#[must_use]
pub fn generate_client_secret() -> String {
    random_alphanumeric(32)
}

/// Generates a device-flow user code in `XXXX-XXXX` display form.
///
/// Eight characters from a 32-character unambiguous alphabet give 40 bits
/// of entropy, which combined with the device endpoint's rate limiting is
/// sufficient for the short code lifetime.
#[must_use]
pub fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.random_range(0..USER_CODE_ALPHABET.len());
        code.push(char::from(USER_CODE_ALPHABET[idx]));
    }
    code
}

/// Normalizes a user code as typed by a user: uppercases and strips
/// separators and whitespace.
#[must_use]
pub fn normalize_user_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_produces_correct_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(32).len(), 32);
    }

    #[test]
    fn random_bytes_produces_different_values() {
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn reference_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_reference_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn reference_ids_are_url_safe() {
        let id = generate_reference_id();
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn user_code_format() {
        let code = generate_user_code();
        assert_eq!(code.len(), 9);
        assert_eq!(code.as_bytes()[4], b'-');
        for (i, c) in code.chars().enumerate() {
            if i == 4 {
                continue;
            }
            assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "bad char {c}");
        }
    }

    #[test]
    fn user_code_avoids_ambiguous_characters() {
        for _ in 0..100 {
            let code = generate_user_code();
            assert!(!code.contains(['I', 'O', '0', '1']));
        }
    }

    #[test]
    fn normalize_user_code_strips_separator_and_case() {
        assert_eq!(normalize_user_code("abcd-efgh"), "ABCDEFGH");
        assert_eq!(normalize_user_code(" AB CD-EF GH "), "ABCDEFGH");
    }
}
