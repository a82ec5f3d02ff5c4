//! Common utility functions for RWP cryptographic operations.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{CryptoError, Result};

/// Returns the current Unix timestamp in milliseconds.
///
/// This is the single source of truth for timestamp generation across the
/// client: token expiry checks and request timestamps all go through here.
///
/// # Panics
///
/// Panics if the system time is set before the Unix epoch (January 1, 1970).
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before Unix epoch")
        .as_millis() as u64
}

/// Generate cryptographically secure random bytes.
///
/// Uses the system's CSPRNG to fill a fixed-size array with random bytes.
///
/// # Example
///
/// ```
/// use rwp_crypto::generate_random_bytes;
///
/// let iv: [u8; 12] = generate_random_bytes();
/// let salt: [u8; 32] = generate_random_bytes();
/// ```
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Base64url encode data without padding.
///
/// This is the wire encoding for every binary field in the protocol:
/// fingerprints, IVs, ciphertexts, public keys, nonces.
pub fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Base64url decode data (padding not accepted).
pub fn base64_url_decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data).map_err(CryptoError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp_ms() {
        let ts = current_timestamp_ms();
        // After Sep 2020, in milliseconds
        assert!(ts > 1_600_000_000_000);
    }

    #[test]
    fn test_generate_random_bytes_different() {
        let a: [u8; 24] = generate_random_bytes();
        let b: [u8; 24] = generate_random_bytes();
        assert_ne!(a, b, "Random bytes should be different");
    }

    #[test]
    fn test_base64_url_roundtrip() {
        let original = b"hello world!";
        let encoded = base64_url_encode(original);
        let decoded = base64_url_decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_base64_url_no_padding() {
        let encoded = base64_url_encode(b"a");
        assert!(!encoded.contains('='), "Should not contain padding");
    }

    #[test]
    fn test_base64_url_decode_invalid() {
        assert!(base64_url_decode("!!invalid!!").is_err());
    }
}
