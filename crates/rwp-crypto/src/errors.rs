//! Error types for rwp-crypto operations.

use thiserror::Error;

/// Errors produced by session-key derivation and payload encryption.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The server key material could not be parsed as a P-256 SPKI document.
    #[error("Invalid server public key: not a valid P-256 SPKI document")]
    InvalidServerKey,

    /// HKDF expansion failed.
    #[error("Session key derivation failed")]
    KeyDerivationFailed,

    /// AEAD encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD authentication failed: tampered or corrupted data. No partial
    /// plaintext is ever returned alongside this error.
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// A base64url field could not be decoded.
    #[error("Invalid base64url encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// An IV had the wrong length for AES-GCM.
    #[error("Invalid IV length: expected {expected} bytes")]
    InvalidIvLength {
        /// The required IV size.
        expected: usize,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
