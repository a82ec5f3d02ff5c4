//! Session-key derivation and payload encryption.
//!
//! Implements the RWP application-layer channel:
//! - Curve: NIST P-256, ephemeral client keypair per session
//! - ECDH shared secret → HKDF-SHA256 (random 32-byte salt, fixed info
//!   label) → AES-256-GCM session key
//! - Fresh random 12-byte IV per encryption; the ciphertext carries the
//!   GCM authentication tag
//!
//! Wire format for an encrypted payload: `{ iv: base64url, ct: base64url }`.
//! The client's key-exchange upload is the raw uncompressed EC point plus a
//! one-time 16-byte nonce, both base64url.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use p256::PublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::constants::*;
use crate::errors::{CryptoError, Result};
use crate::utils::{base64_url_decode, base64_url_encode, generate_random_bytes};

/// An encrypted payload as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// base64url-encoded 12-byte AES-GCM IV, fresh per encryption.
    pub iv: String,
    /// base64url-encoded ciphertext, GCM tag included.
    pub ct: String,
}

/// The client half of the key-exchange upload, ready for the wire.
#[derive(Debug, Clone)]
pub struct KeyExchangeInit {
    /// base64url of the raw uncompressed EC point (65 bytes).
    pub client_pub: String,
    /// base64url of a fresh 16-byte one-time nonce.
    pub cnonce: String,
}

/// A derived AES-256-GCM session key, held only in volatile memory.
///
/// The raw key bytes are consumed by the cipher at construction and never
/// exposed afterwards.
pub struct SessionKey {
    cipher: Aes256Gcm,
}

impl SessionKey {
    /// Wrap 32 bytes of key material as a session key.
    pub fn new(key: &[u8; SESSION_KEY_SIZE]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key).expect("32 bytes is a valid AES-256 key");
        Self { cipher }
    }

    /// Encrypt a plaintext, producing a wire-ready payload.
    ///
    /// A fresh random IV is generated on every call; reusing an IV with
    /// the same key is a protocol violation.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let iv: [u8; GCM_IV_SIZE] = generate_random_bytes();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedPayload {
            iv: base64_url_encode(&iv),
            ct: base64_url_encode(&ciphertext),
        })
    }

    /// Decrypt a wire payload.
    ///
    /// Fails with [`CryptoError::DecryptionFailed`] when the GCM tag does
    /// not verify; no partial plaintext is returned on failure.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let iv = base64_url_decode(&payload.iv)?;
        if iv.len() != GCM_IV_SIZE {
            return Err(CryptoError::InvalidIvLength {
                expected: GCM_IV_SIZE,
            });
        }
        let ciphertext = base64_url_decode(&payload.ct)?;

        self.cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("SessionKey")
    }
}

/// Derive a session key against a server's P-256 public key (SPKI DER).
///
/// Generates an ephemeral client keypair, computes the ECDH shared secret,
/// and expands it through HKDF-SHA256 with a random 32-byte salt and the
/// fixed `"kdf"` info label into an AES-256-GCM key. The returned
/// [`KeyExchangeInit`] carries what the server needs to derive its matching
/// key; the ephemeral secret and intermediate material are dropped (and
/// zeroized) before returning.
pub fn derive_session_key(server_spki_der: &[u8]) -> Result<(SessionKey, KeyExchangeInit)> {
    let server_pub =
        PublicKey::from_public_key_der(server_spki_der).map_err(|_| CryptoError::InvalidServerKey)?;

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let client_pub_point = ephemeral.public_key().to_encoded_point(false);
    let cnonce: [u8; CLIENT_NONCE_SIZE] = generate_random_bytes();

    let shared = ephemeral.diffie_hellman(&server_pub);

    let salt: [u8; HKDF_SALT_SIZE] = generate_random_bytes();
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared.raw_secret_bytes());
    let mut okm = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    hkdf.expand(HKDF_INFO, okm.as_mut())
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    let key = SessionKey::new(&okm);
    let init = KeyExchangeInit {
        client_pub: base64_url_encode(client_pub_point.as_bytes()),
        cnonce: base64_url_encode(&cnonce),
    };

    Ok((key, init))
}
