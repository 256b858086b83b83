//! Signing and encryption credential descriptors.
//!
//! A credential combines the key material the host provisioned, optional
//! X.509 certificate metadata, and a derived key identifier. Credentials
//! are stored in the server options and sorted by the configuration
//! resolver; the token pipelines pick the first suitable entry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde_json::{json, Value};

use crate::algorithm::SigningAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::hash::{sha1_thumbprint, sha256};
use crate::jwe;

/// Length to which derived key identifiers are truncated.
const KEY_ID_LEN: usize = 40;

/// Elliptic curves supported for ECDSA credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
}

impl EcCurve {
    /// Returns the JWK `crv` name.
    #[must_use]
    pub const fn crv_name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
        }
    }
}

/// Public key material carried by a credential.
///
/// The private half lives inside the opaque `jsonwebtoken` keys; the
/// public components here feed the JWKS projection and key-id derivation.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// RSA public components.
    Rsa {
        /// Modulus bytes (big-endian, unsigned).
        modulus: Vec<u8>,
        /// Public exponent bytes (big-endian, unsigned).
        exponent: Vec<u8>,
    },
    /// Elliptic-curve public point.
    Ec {
        /// Curve.
        curve: EcCurve,
        /// X coordinate bytes.
        x: Vec<u8>,
        /// Y coordinate bytes.
        y: Vec<u8>,
    },
    /// Edwards-curve public key (Ed25519).
    Okp {
        /// Public key bytes.
        x: Vec<u8>,
    },
    /// Shared secret.
    Symmetric {
        /// Secret bytes. Never published.
        secret: Vec<u8>,
    },
}

/// X.509 certificate metadata attached to a credential.
#[derive(Debug, Clone)]
pub struct X509Metadata {
    /// DER-encoded certificate.
    pub der: Vec<u8>,
    /// Validity window start.
    pub not_before: DateTime<Utc>,
    /// Validity window end.
    pub not_after: DateTime<Utc>,
}

impl X509Metadata {
    /// Returns the certificate SHA-1 thumbprint as uppercase hex.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        sha1_thumbprint(&self.der)
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect()
    }

    /// Returns whether the certificate is within its validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }
}

/// A signing credential: algorithm, key material, optional certificate,
/// and the JWS keys derived from the provisioned private key.
#[derive(Clone)]
pub struct SigningCredential {
    algorithm: SigningAlgorithm,
    material: KeyMaterial,
    certificate: Option<X509Metadata>,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("certificate", &self.certificate.is_some())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl SigningCredential {
    /// Creates a symmetric (HMAC) signing credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not an HMAC variant.
    pub fn from_symmetric(secret: &[u8], algorithm: SigningAlgorithm) -> CryptoResult<Self> {
        if !algorithm.is_symmetric() {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "{algorithm} is not a symmetric algorithm"
            )));
        }
        Ok(Self {
            algorithm,
            material: KeyMaterial::Symmetric {
                secret: secret.to_vec(),
            },
            certificate: None,
            key_id: None,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Creates an RSA signing credential from a PEM private key and the
    /// matching public components.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the algorithm is not
    /// RSA-based.
    pub fn from_rsa_pem(
        private_key_pem: &[u8],
        modulus: Vec<u8>,
        exponent: Vec<u8>,
        algorithm: SigningAlgorithm,
    ) -> CryptoResult<Self> {
        if !algorithm.is_rsa() {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "{algorithm} is not an RSA algorithm"
            )));
        }
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA PEM key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(&modulus),
            &URL_SAFE_NO_PAD.encode(&exponent),
        )
        .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA components: {e}")))?;

        Ok(Self {
            algorithm,
            material: KeyMaterial::Rsa { modulus, exponent },
            certificate: None,
            key_id: None,
            encoding_key,
            decoding_key,
        })
    }

    /// Creates an ECDSA signing credential from a PEM private key and the
    /// matching public point.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the algorithm is not
    /// ECDSA-based.
    pub fn from_ec_pem(
        private_key_pem: &[u8],
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
        algorithm: SigningAlgorithm,
    ) -> CryptoResult<Self> {
        if !algorithm.is_ecdsa() {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "{algorithm} is not an ECDSA algorithm"
            )));
        }
        let encoding_key = EncodingKey::from_ec_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid EC PEM key: {e}")))?;
        let decoding_key = DecodingKey::from_ec_components(
            &URL_SAFE_NO_PAD.encode(&x),
            &URL_SAFE_NO_PAD.encode(&y),
        )
        .map_err(|e| CryptoError::InvalidKey(format!("invalid EC components: {e}")))?;

        Ok(Self {
            algorithm,
            material: KeyMaterial::Ec { curve, x, y },
            certificate: None,
            key_id: None,
            encoding_key,
            decoding_key,
        })
    }

    /// Generates an ephemeral ES256 credential.
    ///
    /// Intended for development and tests; production deployments
    /// provision persistent keys so that issued tokens survive restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_dev() -> CryptoResult<Self> {
        use aws_lc_rs::rand::SystemRandom;
        use aws_lc_rs::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| CryptoError::InvalidKey("EC key generation failed".to_string()))?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, document.as_ref())
            .map_err(|e| CryptoError::InvalidKey(format!("generated key rejected: {e}")))?;

        // Uncompressed SEC1 point: 0x04 || X || Y, 32 bytes per coordinate.
        let public = key_pair.public_key().as_ref();
        if public.len() != 65 || public[0] != 0x04 {
            return Err(CryptoError::InvalidKey(
                "unexpected EC public key encoding".to_string(),
            ));
        }
        let x = public[1..33].to_vec();
        let y = public[33..65].to_vec();

        let pem = wrap_pem(document.as_ref(), "PRIVATE KEY");
        Self::from_ec_pem(pem.as_bytes(), EcCurve::P256, x, y, SigningAlgorithm::Es256)
    }

    /// Attaches X.509 certificate metadata.
    #[must_use]
    pub fn with_certificate(mut self, certificate: X509Metadata) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Sets an explicit key identifier.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Returns the key identifier, if one has been assigned.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Returns the public key material.
    #[must_use]
    pub const fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Returns the attached certificate metadata, if any.
    #[must_use]
    pub const fn certificate(&self) -> Option<&X509Metadata> {
        self.certificate.as_ref()
    }

    /// Returns whether this credential uses an asymmetric key pair.
    #[must_use]
    pub const fn is_asymmetric(&self) -> bool {
        !self.algorithm.is_symmetric()
    }

    /// Returns the JWS encoding key.
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Returns the JWS decoding key.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Assigns a key identifier when none is present.
    ///
    /// Derivation: X.509 certificate thumbprint when a certificate is
    /// attached; otherwise the base64url modulus (RSA, uppercased) or X
    /// coordinate (EC/OKP), truncated to 40 characters; symmetric secrets
    /// use a SHA-256 thumbprint so the secret itself never leaks.
    pub fn ensure_key_id(&mut self) {
        if self.key_id.is_some() {
            return;
        }
        let kid = if let Some(cert) = &self.certificate {
            cert.thumbprint()
        } else {
            match &self.material {
                KeyMaterial::Rsa { modulus, .. } => {
                    truncate(&URL_SAFE_NO_PAD.encode(modulus)).to_uppercase()
                }
                KeyMaterial::Ec { x, .. } | KeyMaterial::Okp { x } => {
                    truncate(&URL_SAFE_NO_PAD.encode(x))
                }
                KeyMaterial::Symmetric { secret } => {
                    truncate(&URL_SAFE_NO_PAD.encode(sha256(secret)))
                }
            }
        };
        self.key_id = Some(kid);
    }

    /// Returns the public JWK for this credential, or `None` for
    /// symmetric keys, which are never published.
    #[must_use]
    pub fn as_jwk(&self) -> Option<Value> {
        let mut jwk = match &self.material {
            KeyMaterial::Rsa { modulus, exponent } => json!({
                "kty": "RSA",
                "n": URL_SAFE_NO_PAD.encode(modulus),
                "e": URL_SAFE_NO_PAD.encode(exponent),
            }),
            KeyMaterial::Ec { curve, x, y } => json!({
                "kty": "EC",
                "crv": curve.crv_name(),
                "x": URL_SAFE_NO_PAD.encode(x),
                "y": URL_SAFE_NO_PAD.encode(y),
            }),
            KeyMaterial::Okp { x } => json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "x": URL_SAFE_NO_PAD.encode(x),
            }),
            KeyMaterial::Symmetric { .. } => return None,
        };
        jwk["use"] = json!("sig");
        jwk["alg"] = json!(self.algorithm.jwa_name());
        if let Some(kid) = &self.key_id {
            jwk["kid"] = json!(kid);
        }
        Some(jwk)
    }
}

/// Sorts signing credentials into selection precedence:
/// symmetric keys first, then currently-valid X.509 credentials by
/// furthest expiration, then certificate-less asymmetric keys, then
/// X.509 credentials outside their validity window. The sort is stable,
/// so insertion order breaks ties within each tier.
pub fn sort_signing_credentials(credentials: &mut [SigningCredential], now: DateTime<Utc>) {
    credentials.sort_by_key(|credential| {
        let tier = precedence_tier(credential, now);
        let expiry = if tier == 1 {
            credential
                .certificate()
                .map_or(0, |cert| -cert.not_after.timestamp())
        } else {
            0
        };
        (tier, expiry)
    });
}

fn precedence_tier(credential: &SigningCredential, now: DateTime<Utc>) -> u8 {
    if !credential.is_asymmetric() {
        return 0;
    }
    match credential.certificate() {
        Some(cert) if cert.is_valid_at(now) => 1,
        None => 2,
        Some(_) => 3,
    }
}

/// A content-encryption credential: a 256-bit direct key with an optional
/// validity window.
#[derive(Clone)]
pub struct EncryptionCredential {
    secret: Vec<u8>,
    key_id: Option<String>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for EncryptionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionCredential")
            .field("key_id", &self.key_id)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl EncryptionCredential {
    /// Creates an encryption credential from a 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is not exactly 32 bytes.
    pub fn from_secret(secret: &[u8]) -> CryptoResult<Self> {
        if secret.len() != jwe::KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "encryption credential requires a {}-byte secret, got {}",
                jwe::KEY_LEN,
                secret.len()
            )));
        }
        Ok(Self {
            secret: secret.to_vec(),
            key_id: None,
            not_before: None,
            not_after: None,
        })
    }

    /// Generates a fresh random encryption credential.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            secret: crate::random::random_bytes(jwe::KEY_LEN),
            key_id: None,
            not_before: None,
            not_after: None,
        }
    }

    /// Restricts the credential to a validity window.
    #[must_use]
    pub fn with_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self.not_after = Some(not_after);
        self
    }

    /// Sets an explicit key identifier.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Returns the key identifier, if one has been assigned.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Returns whether the credential is usable at the given instant.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|nb| nb <= now) && self.not_after.is_none_or(|na| now < na)
    }

    /// Assigns a thumbprint-derived key identifier when none is present.
    pub fn ensure_key_id(&mut self) {
        if self.key_id.is_none() {
            self.key_id = Some(truncate(&URL_SAFE_NO_PAD.encode(sha256(&self.secret))));
        }
    }

    /// Encrypts a payload into a compact JWE.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        jwe::encrypt(&self.secret, self.key_id.as_deref(), plaintext)
    }

    /// Decrypts a compact JWE.
    ///
    /// # Errors
    ///
    /// Returns a detail-free error for any malformed or unauthenticated
    /// input.
    pub fn decrypt(&self, token: &str) -> CryptoResult<Vec<u8>> {
        jwe::decrypt(&self.secret, token)
    }
}

fn truncate(encoded: &str) -> String {
    encoded.chars().take(KEY_ID_LEN).collect()
}

fn wrap_pem(der: &[u8], label: &str) -> String {
    use base64::engine::general_purpose::STANDARD;
    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn symmetric() -> SigningCredential {
        SigningCredential::from_symmetric(b"0123456789abcdef0123456789abcdef", SigningAlgorithm::Hs256)
            .unwrap()
    }

    fn with_cert(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> SigningCredential {
        SigningCredential::generate_dev()
            .unwrap()
            .with_certificate(X509Metadata {
                der: vec![0x30, 0x82, 0x01, 0x00],
                not_before,
                not_after,
            })
    }

    #[test]
    fn generated_credential_is_asymmetric() {
        let credential = SigningCredential::generate_dev().unwrap();
        assert!(credential.is_asymmetric());
        assert_eq!(credential.algorithm(), SigningAlgorithm::Es256);
    }

    #[test]
    fn ec_key_id_derives_from_x_coordinate() {
        let mut credential = SigningCredential::generate_dev().unwrap();
        credential.ensure_key_id();
        let KeyMaterial::Ec { x, .. } = credential.material().clone() else {
            panic!("expected EC material");
        };
        let expected: String = URL_SAFE_NO_PAD.encode(&x).chars().take(40).collect();
        assert_eq!(credential.key_id().unwrap(), expected);
    }

    #[test]
    fn rsa_key_id_is_uppercased_modulus() {
        // Use the derivation rule directly against fabricated material.
        let modulus = vec![0xAB; 64];
        let expected: String = URL_SAFE_NO_PAD
            .encode(&modulus)
            .chars()
            .take(40)
            .collect::<String>()
            .to_uppercase();
        assert_eq!(expected.len(), 40);
        assert!(expected.chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn certificate_thumbprint_wins_over_material() {
        let now = Utc::now();
        let mut credential = with_cert(now - Duration::days(1), now + Duration::days(1));
        credential.ensure_key_id();
        let expected = credential.certificate().unwrap().thumbprint();
        assert_eq!(credential.key_id().unwrap(), expected);
    }

    #[test]
    fn explicit_key_id_is_preserved() {
        let mut credential = symmetric().with_key_id("explicit");
        credential.ensure_key_id();
        assert_eq!(credential.key_id(), Some("explicit"));
    }

    #[test]
    fn precedence_symmetric_then_valid_certs_by_expiry() {
        let now = Utc::now();
        let mut credentials = vec![
            SigningCredential::generate_dev().unwrap(), // tier 2
            with_cert(now - Duration::days(1), now + Duration::days(10)), // tier 1, near
            with_cert(now + Duration::days(5), now + Duration::days(30)), // tier 3
            with_cert(now - Duration::days(1), now + Duration::days(100)), // tier 1, far
            symmetric(),                                // tier 0
        ];
        sort_signing_credentials(&mut credentials, now);

        assert!(!credentials[0].is_asymmetric());
        // Valid certs next, furthest not-after first.
        assert_eq!(
            credentials[1].certificate().unwrap().not_after,
            now + Duration::days(100)
        );
        assert_eq!(
            credentials[2].certificate().unwrap().not_after,
            now + Duration::days(10)
        );
        // Certificate-less asymmetric precedes the not-yet-valid cert.
        assert!(credentials[3].certificate().is_none());
        assert!(!credentials[4].certificate().unwrap().is_valid_at(now));
    }

    #[test]
    fn encryption_credential_round_trip() {
        let mut credential = EncryptionCredential::generate();
        credential.ensure_key_id();
        let token = credential.encrypt(b"secret payload").unwrap();
        assert_eq!(credential.decrypt(&token).unwrap(), b"secret payload");
    }

    #[test]
    fn encryption_credential_validity_window() {
        let now = Utc::now();
        let credential = EncryptionCredential::generate()
            .with_validity(now - Duration::hours(1), now + Duration::hours(1));
        assert!(credential.is_valid_at(now));
        assert!(!credential.is_valid_at(now + Duration::hours(2)));
        assert!(!credential.is_valid_at(now - Duration::hours(2)));
    }

    #[test]
    fn jwk_projection_omits_symmetric_keys() {
        assert!(symmetric().as_jwk().is_none());

        let mut credential = SigningCredential::generate_dev().unwrap();
        credential.ensure_key_id();
        let jwk = credential.as_jwk().unwrap();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["crv"], "P-256");
        assert_eq!(jwk["alg"], "ES256");
        assert!(jwk["kid"].is_string());
    }
}
