//! Wire types for the auto-login protocol.
//!
//! A login exchange is a tagged envelope: `type: 1` carries the payload in
//! the clear, `type: 2` replaces it with `{ iv, ct }` from the session
//! channel. Both directions use the same tagging, and both encode and
//! decode sites match exhaustively on the tag.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use rwp_crypto::EncryptedPayload;

use crate::error::AppError;

/// Envelope tag: plaintext payload.
pub const MSG_AUTO: u8 = 1;
/// Envelope tag: payload encrypted by the session channel.
pub const MSG_AUTO_ENCRYPTED: u8 = 2;

bitflags! {
    /// Outcome flags returned by the login endpoint.
    ///
    /// Each bit signals one condition independently; 16 bits are reserved.
    /// `SUCCESS` and any failure bit are mutually exclusive by server
    /// contract; a response violating that is a protocol error, never a
    /// silent override.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoginStatus: u16 {
        const SUCCESS              = 1 << 0;
        const USER_NOT_FOUND       = 1 << 1;
        const USERNAME_NOT_FOUND   = 1 << 2;
        const PASSWORD_INCORRECT   = 1 << 3;
        const USER_TOKEN_INVALID   = 1 << 4;
        const DEVICE_TOKEN_INVALID = 1 << 5;
        const ATTEMPTS_EXCEEDED    = 1 << 6;
        const IP_CHANGED           = 1 << 7;
        const CONNECTION_INSECURE  = 1 << 8;
        const CLIENT_ERROR         = 1 << 9;
        const SERVER_ERROR         = 1 << 10;
        const NETWORK_ERROR        = 1 << 11;

        /// Every defined non-success condition.
        const FAILURE_MASK = Self::USER_NOT_FOUND.bits()
            | Self::USERNAME_NOT_FOUND.bits()
            | Self::PASSWORD_INCORRECT.bits()
            | Self::USER_TOKEN_INVALID.bits()
            | Self::DEVICE_TOKEN_INVALID.bits()
            | Self::ATTEMPTS_EXCEEDED.bits()
            | Self::CONNECTION_INSECURE.bits()
            | Self::CLIENT_ERROR.bits()
            | Self::SERVER_ERROR.bits()
            | Self::NETWORK_ERROR.bits();
    }
}

// Manual Serialize/Deserialize: the wire carries the raw u16. Reserved
// bits a newer server may set are retained, not truncated.
impl Serialize for LoginStatus {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LoginStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u16::deserialize(deserializer)?;
        Ok(LoginStatus::from_bits_retain(bits))
    }
}

/// A token with its unix-ms expiry, as issued by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token: String,
    pub expires_at: u64,
}

impl TokenRecord {
    /// A token is usable strictly before its expiry.
    pub fn is_usable(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at
    }
}

/// The auto-login payload. Optional fields are omitted from the wire when
/// absent, so the payload is null/empty-stripped by construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoginData {
    pub user_id: String,
    pub user_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
}

/// The decoded auto-login response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoginResponse {
    pub code: LoginStatus,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_token: Option<TokenRecord>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The outgoing envelope, tagged by transport trust at call time.
#[derive(Debug)]
pub enum LoginEnvelope {
    Plain(AutoLoginData),
    Sealed(EncryptedPayload),
}

#[derive(Serialize)]
struct RawRequest {
    #[serde(rename = "type")]
    tag: u8,
    msg: serde_json::Value,
    timestamp: u64,
}

impl LoginEnvelope {
    /// Encode for the wire: `{ type, msg, timestamp }`.
    pub fn into_wire(self, timestamp: u64) -> Result<serde_json::Value, AppError> {
        let (tag, msg) = match self {
            LoginEnvelope::Plain(data) => (
                MSG_AUTO,
                serde_json::to_value(&data)
                    .map_err(|e| AppError::ProtocolViolation(e.to_string()))?,
            ),
            LoginEnvelope::Sealed(payload) => (
                MSG_AUTO_ENCRYPTED,
                serde_json::to_value(&payload)
                    .map_err(|e| AppError::ProtocolViolation(e.to_string()))?,
            ),
        };
        serde_json::to_value(RawRequest {
            tag,
            msg,
            timestamp,
        })
        .map_err(|e| AppError::ProtocolViolation(e.to_string()))
    }
}

/// The incoming envelope before the payload is interpreted.
#[derive(Debug, Deserialize)]
pub struct RawResponse {
    #[serde(rename = "type")]
    pub tag: u8,
    pub msg: serde_json::Value,
}

/// The incoming envelope, decoded by its tag.
#[derive(Debug)]
pub enum ResponseEnvelope {
    Plain(AutoLoginResponse),
    Sealed(EncryptedPayload),
}

impl ResponseEnvelope {
    /// Decode the tag exhaustively; unknown tags are protocol errors.
    pub fn from_wire(raw: RawResponse) -> Result<Self, AppError> {
        match raw.tag {
            MSG_AUTO => serde_json::from_value(raw.msg)
                .map(ResponseEnvelope::Plain)
                .map_err(|e| AppError::ProtocolDecode(format!("bad plain response: {e}"))),
            MSG_AUTO_ENCRYPTED => serde_json::from_value(raw.msg)
                .map(ResponseEnvelope::Sealed)
                .map_err(|e| AppError::ProtocolDecode(format!("bad encrypted response: {e}"))),
            other => Err(AppError::ProtocolViolation(format!(
                "unknown message type {other}"
            ))),
        }
    }
}
