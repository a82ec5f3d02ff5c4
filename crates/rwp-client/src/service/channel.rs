//! The session crypto channel engine.
//!
//! Owns the page-lifetime AES-GCM session key: fetches (or reuses the
//! cached) server public key, runs the key-exchange round trip, and
//! derives the key exactly once. Concurrent callers during derivation
//! await the same in-flight operation; a failed derivation leaves the
//! channel unestablished so only an explicit caller retry re-derives.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use rwp_crypto::{base64_url_decode, derive_session_key, EncryptedPayload, SessionKey};

use crate::error::AppError;
use crate::infra::http_client::ApiClient;
use crate::infra::store::{context_keys, KvStore, Partition};
use crate::trust::TransportTrust;

const KEY_EXCHANGE_PATH: &str = "/api/key-exchange";

#[derive(Deserialize)]
struct ServerKeyResponse {
    pubkey: String,
}

#[derive(Serialize)]
struct KeyExchangeBody {
    client_pub: String,
    cnonce: String,
}

pub struct SessionChannel {
    http: ApiClient,
    store: Arc<KvStore>,
    key: OnceCell<SessionKey>,
}

impl SessionChannel {
    pub fn new(http: ApiClient, store: Arc<KvStore>) -> Self {
        Self {
            http,
            store,
            key: OnceCell::new(),
        }
    }

    /// Whether the session key has been derived.
    pub fn is_ready(&self) -> bool {
        self.key.initialized()
    }

    /// Establish the channel if the transport requires it.
    ///
    /// Returns `false` when the transport is trusted: encryption is not
    /// required and the channel stays unestablished. Otherwise derives the
    /// session key (single-flight) and returns `true`.
    pub async fn ensure_ready(&self, trust: &TransportTrust) -> Result<bool, AppError> {
        if trust.is_trusted() {
            return Ok(false);
        }
        self.key.get_or_try_init(|| self.derive()).await?;
        Ok(true)
    }

    /// Encrypt with the established session key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, AppError> {
        let key = self
            .key
            .get()
            .ok_or_else(|| AppError::ProtocolViolation("session channel not established".into()))?;
        Ok(key.encrypt(plaintext)?)
    }

    /// Decrypt with the established session key. Authentication failure
    /// surfaces as a crypto error; no partial data leaks.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, AppError> {
        let key = self
            .key
            .get()
            .ok_or_else(|| AppError::ProtocolViolation("session channel not established".into()))?;
        Ok(key.decrypt(payload)?)
    }

    async fn derive(&self) -> Result<SessionKey, AppError> {
        let spki = self.server_public_key().await?;

        let (key, init) =
            derive_session_key(&spki).map_err(|e| AppError::KeyExchange(e.to_string()))?;

        // Upload the client half; the server derives its matching key.
        // Network failure here is a hard error for the caller to classify.
        self.http
            .post_no_response(
                KEY_EXCHANGE_PATH,
                &KeyExchangeBody {
                    client_pub: init.client_pub,
                    cnonce: init.cnonce,
                },
            )
            .await?;

        tracing::debug!("session channel established");
        Ok(key)
    }

    /// The server's SPKI key: store cache first, network second. The cache
    /// write is opportunistic; its absence or failure only costs a round
    /// trip next session.
    async fn server_public_key(&self) -> Result<Vec<u8>, AppError> {
        if let Some(cached) =
            self.store
                .get_json::<String>(Partition::Context, context_keys::SERVER_PUBKEY)
        {
            match base64_url_decode(&cached) {
                Ok(der) => return Ok(der),
                Err(e) => {
                    tracing::warn!(error = %e, "cached server key undecodable, refetching");
                }
            }
        }

        let resp: ServerKeyResponse = self.http.get_json(KEY_EXCHANGE_PATH).await?;
        let der = base64_url_decode(&resp.pubkey)
            .map_err(|e| AppError::KeyExchange(format!("invalid server key payload: {e}")))?;

        if let Err(e) =
            self.store
                .put_json(Partition::Context, context_keys::SERVER_PUBKEY, &resp.pubkey)
        {
            tracing::warn!(error = %e, "failed to cache server public key");
        }

        Ok(der)
    }
}
