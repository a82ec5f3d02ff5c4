//! Cryptographic constants for the RWP session protocol.
//!
//! All sizes and labels here are wire-visible (directly or as hash input)
//! and MUST NOT change without a protocol version bump.

/// Size of the persisted device seed in bytes (base64url-encoded for storage)
pub const DEVICE_SEED_SIZE: usize = 24;

/// Size of the one-time client nonce sent during key exchange
pub const CLIENT_NONCE_SIZE: usize = 16;

/// Size of AES-GCM initialization vectors in bytes (96 bits)
pub const GCM_IV_SIZE: usize = 12;

/// Size of the random HKDF salt in bytes
pub const HKDF_SALT_SIZE: usize = 32;

/// Size of the derived AES-GCM session key in bytes (256 bits)
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of an uncompressed SEC1 P-256 point (0x04 || x || y)
pub const EC_POINT_UNCOMPRESSED_SIZE: usize = 65;

/// Fixed HKDF info label for session-key expansion
pub const HKDF_INFO: &[u8] = b"kdf";

/// Cap applied to the reported CPU core count before hashing
pub const FINGERPRINT_CORES_CAP: u32 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_correct_sizes() {
        assert_eq!(DEVICE_SEED_SIZE, 24);
        assert_eq!(CLIENT_NONCE_SIZE, 16);
        assert_eq!(GCM_IV_SIZE, 12);
        assert_eq!(HKDF_SALT_SIZE, 32);
        assert_eq!(SESSION_KEY_SIZE, 32);
    }
}
