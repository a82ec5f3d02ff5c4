use std::fmt;

use rwp_crypto::CryptoError;

use crate::protocol::LoginStatus;

#[derive(Debug)]
pub enum AppError {
    // Network
    ServerUnreachable,
    Timeout,
    ServerError(u16, String),
    UnexpectedContentType(String),

    // Protocol
    ProtocolDecode(String),
    ProtocolViolation(String),

    // Crypto
    KeyExchange(String),
    Crypto(CryptoError),

    // Local
    Storage(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerUnreachable => write!(f, "Cannot reach the server. Check your connection."),
            Self::Timeout => write!(f, "Request timed out."),
            Self::ServerError(code, msg) => write!(f, "Server error ({code}): {msg}"),
            Self::UnexpectedContentType(ct) => {
                write!(f, "Unexpected response content type: {ct}")
            }
            Self::ProtocolDecode(msg) => write!(f, "Malformed server response: {msg}"),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {msg}"),
            Self::KeyExchange(msg) => write!(f, "Key exchange failed: {msg}"),
            Self::Crypto(err) => write!(f, "Cryptographic operation failed: {err}"),
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ServerUnreachable
        } else if let Some(status) = err.status() {
            Self::ServerError(status.as_u16(), err.to_string())
        } else {
            Self::ServerUnreachable
        }
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl AppError {
    /// Fold this error into the status vocabulary surfaced to the caller.
    ///
    /// Transport, timeout and key-exchange failures read as a network
    /// problem; decryption and post-decryption decode failures are the
    /// client's problem. The auto-login path never shows the raw error.
    pub fn as_status(&self) -> LoginStatus {
        match self {
            Self::ServerUnreachable
            | Self::Timeout
            | Self::ServerError(..)
            | Self::UnexpectedContentType(_)
            | Self::ProtocolDecode(_)
            | Self::KeyExchange(_) => LoginStatus::NETWORK_ERROR,
            Self::ProtocolViolation(_) | Self::Crypto(_) | Self::Storage(_) => {
                LoginStatus::CLIENT_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
