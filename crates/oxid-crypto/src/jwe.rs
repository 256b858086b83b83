//! Compact JWE content encryption.
//!
//! Access and refresh token payloads are encrypted with a direct symmetric
//! key (`alg=dir`) and AES-256-GCM (`enc=A256GCM`), producing the
//! five-part compact serialization of RFC 7516. The protected header is
//! the additional authenticated data, so header tampering is detected at
//! decryption.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use crate::error::{CryptoError, CryptoResult};
use crate::random::random_bytes;

/// Size of the direct encryption key in bytes (A256GCM).
pub const KEY_LEN: usize = 32;

/// Returns whether a compact token looks like a JWE (five segments).
#[must_use]
pub fn is_encrypted(token: &str) -> bool {
    token.split('.').count() == 5
}

/// Encrypts a payload into a compact JWE.
///
/// # Errors
///
/// Returns an error if the key length is wrong or sealing fails.
pub fn encrypt(key: &[u8], key_id: Option<&str>, plaintext: &[u8]) -> CryptoResult<String> {
    let sealing_key = aead_key(key)?;

    let mut header = json!({ "alg": "dir", "enc": "A256GCM" });
    if let Some(kid) = key_id {
        header["kid"] = json!(kid);
    }
    let protected = URL_SAFE_NO_PAD.encode(header.to_string());

    let iv = random_bytes(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|_| CryptoError::Encryption("invalid nonce".to_string()))?;

    let mut in_out = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(nonce, Aad::from(protected.as_bytes()), &mut in_out)
        .map_err(|_| CryptoError::Encryption("AEAD sealing failed".to_string()))?;

    Ok(format!(
        "{protected}..{}.{}.{}",
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(&in_out),
        URL_SAFE_NO_PAD.encode(tag.as_ref()),
    ))
}

/// Decrypts a compact JWE produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] for any malformed or
/// unauthenticated input; the error carries no detail by design.
pub fn decrypt(key: &[u8], token: &str) -> CryptoResult<Vec<u8>> {
    let opening_key = aead_key(key)?;

    let parts: Vec<&str> = token.split('.').collect();
    let [protected, encrypted_key, iv, ciphertext, tag] = parts[..] else {
        return Err(CryptoError::Decryption);
    };
    if !encrypted_key.is_empty() {
        // Direct key agreement carries no encrypted key segment.
        return Err(CryptoError::Decryption);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(protected)
        .map_err(|_| CryptoError::Decryption)?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| CryptoError::Decryption)?;
    if header["alg"] != "dir" || header["enc"] != "A256GCM" {
        return Err(CryptoError::Decryption);
    }

    let iv = URL_SAFE_NO_PAD.decode(iv).map_err(|_| CryptoError::Decryption)?;
    let nonce = Nonce::try_assume_unique_for_key(&iv).map_err(|_| CryptoError::Decryption)?;

    let mut in_out = URL_SAFE_NO_PAD
        .decode(ciphertext)
        .map_err(|_| CryptoError::Decryption)?;
    in_out.extend_from_slice(
        &URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| CryptoError::Decryption)?,
    );

    let plaintext = opening_key
        .open_in_place(nonce, Aad::from(protected.as_bytes()), &mut in_out)
        .map_err(|_| CryptoError::Decryption)?;

    Ok(plaintext.to_vec())
}

fn aead_key(key: &[u8]) -> CryptoResult<LessSafeKey> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "A256GCM requires a {KEY_LEN}-byte key, got {}",
            key.len()
        )));
    }
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CryptoError::InvalidKey("AEAD key rejected".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = random_bytes(KEY_LEN);
        let token = encrypt(&key, Some("enc-1"), b"payload").unwrap();
        assert!(is_encrypted(&token));
        assert_eq!(decrypt(&key, &token).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_fails_closed() {
        let token = encrypt(&random_bytes(KEY_LEN), None, b"payload").unwrap();
        let err = decrypt(&random_bytes(KEY_LEN), &token).unwrap_err();
        assert_eq!(err.to_string(), "decryption failed");
    }

    #[test]
    fn tampered_header_is_rejected() {
        let key = random_bytes(KEY_LEN);
        let token = encrypt(&key, None, b"payload").unwrap();
        let mut parts: Vec<String> = token.split('.').map(ToString::to_string).collect();
        parts[0] = URL_SAFE_NO_PAD.encode(r#"{"alg":"dir","enc":"A256GCM","kid":"x"}"#);
        assert!(decrypt(&key, &parts.join(".")).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(encrypt(&[0u8; 16], None, b"payload").is_err());
    }

    #[test]
    fn jws_is_not_mistaken_for_jwe() {
        assert!(!is_encrypted("aaa.bbb.ccc"));
    }
}
