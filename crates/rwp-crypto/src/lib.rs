//! # rwp-crypto
//!
//! Cryptographic primitives for the RWP client agent: device-fingerprint
//! canonicalization and hashing, ECDH(P-256) → HKDF-SHA256 → AES-256-GCM
//! session-key derivation, and authenticated encryption of opaque payloads.
//!
//! This crate is pure computation: no I/O, no network, no storage. The
//! client crate drives the key-exchange round trips and owns key lifetime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod errors;
pub mod fingerprint;
pub mod session;
pub mod utils;

pub use constants::*;
pub use errors::CryptoError;
pub use fingerprint::FingerprintInput;
pub use session::{derive_session_key, EncryptedPayload, KeyExchangeInit, SessionKey};
pub use utils::*;
