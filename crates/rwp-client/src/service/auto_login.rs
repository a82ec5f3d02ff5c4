//! The auto-login engine.
//!
//! Loads candidate credentials, builds the (plain or encrypted) envelope,
//! sends it, interprets the status bitmask, and drives the bounded retry
//! loop: at most one corrective retry per distinct failure cause, a stale
//! device token or a server-declared insecure transport. Every other
//! failure (network, decode, remaining status flags) is final for this
//! session and falls through silently to the manual login path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use url::Url;

use rwp_crypto::current_timestamp_ms;

use crate::device::{DeviceIdentity, DisplayMetrics};
use crate::error::AppError;
use crate::infra::http_client::{ApiClient, DEFAULT_TIMEOUT};
use crate::infra::store::KvStore;
use crate::protocol::{
    AutoLoginData, AutoLoginResponse, LoginEnvelope, LoginStatus, RawResponse, ResponseEnvelope,
};
use crate::service::channel::SessionChannel;
use crate::service::tokens::{self, load_candidate};
use crate::trust::TransportTrust;

const AUTO_LOGIN_PATH: &str = "/auth/auto-login";

/// Static configuration for the agent.
pub struct AgentConfig {
    /// Base URL of the backend.
    pub server_url: String,
    /// Origin the agent considers itself served from, for transport trust
    /// classification. Defaults to `server_url`.
    pub origin: Option<String>,
    /// Build-time application id, embedded in the fingerprint.
    pub app_id: String,
    /// Build-time application version, embedded in the fingerprint.
    pub app_version: String,
    /// Per-request timeout. Defaults to 10 seconds.
    pub request_timeout: Duration,
    /// Display characteristics reported by the embedding shell.
    pub display: Option<DisplayMetrics>,
}

impl AgentConfig {
    pub fn new(
        server_url: impl Into<String>,
        app_id: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            origin: None,
            app_id: app_id.into(),
            app_version: app_version.into(),
            request_timeout: DEFAULT_TIMEOUT,
            display: None,
        }
    }
}

/// What an auto-login attempt resolved to.
///
/// There is no error variant on purpose: internal failures are folded into
/// [`AutoLoginOutcome::Failed`] with a synthetic status, and the caller
/// falls through to manual login without showing a raw error.
#[derive(Debug)]
pub enum AutoLoginOutcome {
    /// Logged in; tokens and username have been persisted.
    Success {
        user_id: String,
        username: String,
        device_id: Option<String>,
    },
    /// Nothing to attempt: no remembered user or no usable token.
    NoCredentials,
    /// The attempt (and any permitted retry) failed.
    Failed {
        status: LoginStatus,
        message: Option<String>,
    },
}

/// The auto-login agent: owns the transport trust decision, the session
/// crypto channel, and the device identity for one page lifetime.
pub struct AutoLoginAgent {
    http: ApiClient,
    store: Arc<KvStore>,
    trust: TransportTrust,
    channel: SessionChannel,
    identity: DeviceIdentity,
    attempt_guard: Mutex<()>,
}

impl AutoLoginAgent {
    pub fn new(config: AgentConfig, store: Arc<KvStore>) -> Result<Self, AppError> {
        let http = ApiClient::new(&config.server_url, config.request_timeout)?;

        let origin = config.origin.unwrap_or_else(|| config.server_url.clone());
        let trust = match Url::parse(&origin) {
            Ok(url) => TransportTrust::classify(&url),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "unparseable origin, assuming untrusted transport");
                TransportTrust::untrusted()
            }
        };

        let channel = SessionChannel::new(http.clone(), store.clone());
        let identity = DeviceIdentity::new(
            config.app_id,
            config.app_version,
            store.clone(),
            config.display,
        );

        Ok(Self {
            http,
            store,
            trust,
            channel,
            identity,
            attempt_guard: Mutex::new(()),
        })
    }

    /// The session-cached transport trust decision.
    pub fn transport_trust(&self) -> &TransportTrust {
        &self.trust
    }

    /// Record `user_id` as the remembered user after an interactive login.
    pub fn remember_login(&self, user_id: &str) -> Result<(), AppError> {
        tokens::remember_login(&self.store, user_id)
    }

    /// Attempt to re-authenticate with stored credentials.
    ///
    /// Sequential per agent: a second call while one is in flight waits
    /// for the first to finish, then runs against the updated store.
    pub async fn auto_login(&self) -> AutoLoginOutcome {
        let _guard = self.attempt_guard.lock().await;

        let candidate = match load_candidate(&self.store) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return AutoLoginOutcome::NoCredentials,
            Err(e) => {
                tracing::warn!(error = %e, "could not load stored credentials");
                return AutoLoginOutcome::NoCredentials;
            }
        };

        let held_device_id = candidate.device_id.clone();
        let mut data = AutoLoginData {
            user_id: candidate.user_id,
            user_token: candidate.user_token,
            device_id: candidate.device_id,
            device_token: candidate.device_token,
            device_fingerprint: None,
        };
        // The fingerprint is the fallback identity signal for a device
        // without a usable token.
        if data.device_id.is_none() || data.device_token.is_none() {
            data.device_fingerprint = self.fingerprint_or_none();
        }

        let mut retried_device_token = false;
        let mut retried_insecure = false;

        loop {
            let response = match self.attempt(&data).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(error = %e, "auto-login attempt errored");
                    return AutoLoginOutcome::Failed {
                        status: e.as_status(),
                        message: None,
                    };
                }
            };

            let code = response.code;

            if code.contains(LoginStatus::SUCCESS) {
                if code.intersects(LoginStatus::FAILURE_MASK) {
                    tracing::warn!(code = code.bits(), "server set success and failure bits together");
                    return AutoLoginOutcome::Failed {
                        status: LoginStatus::CLIENT_ERROR,
                        message: None,
                    };
                }
                if let Err(e) =
                    tokens::persist_login(&self.store, &data.user_id, held_device_id.as_deref(), &response)
                {
                    tracing::warn!(error = %e, "login succeeded but tokens were not persisted");
                }
                return AutoLoginOutcome::Success {
                    user_id: data.user_id,
                    username: response.username,
                    device_id: response.device_id.or(held_device_id),
                };
            }

            if code.contains(LoginStatus::DEVICE_TOKEN_INVALID) && !retried_device_token {
                retried_device_token = true;
                if let Err(e) = tokens::forget_device_token(&self.store) {
                    tracing::warn!(error = %e, "could not drop rejected device token");
                }
                data.device_token = None;
                if data.device_fingerprint.is_none() {
                    data.device_fingerprint = self.fingerprint_or_none();
                }
                tracing::debug!("device token rejected, retrying once without it");
                continue;
            }

            if code.contains(LoginStatus::CONNECTION_INSECURE) && !retried_insecure {
                retried_insecure = true;
                self.trust.force_untrusted();
                tracing::debug!("server declared transport insecure, retrying once encrypted");
                continue;
            }

            return AutoLoginOutcome::Failed {
                status: code,
                message: response.error_message,
            };
        }
    }

    /// One request/response exchange. The envelope tag follows the trust
    /// decision as it stands right now, not as it stood last attempt.
    async fn attempt(&self, data: &AutoLoginData) -> Result<AutoLoginResponse, AppError> {
        let envelope = if self.trust.is_trusted() {
            LoginEnvelope::Plain(data.clone())
        } else {
            self.channel.ensure_ready(&self.trust).await?;
            let plaintext = serde_json::to_vec(data)
                .map_err(|e| AppError::ProtocolViolation(e.to_string()))?;
            LoginEnvelope::Sealed(self.channel.encrypt(&plaintext)?)
        };

        let body = envelope.into_wire(current_timestamp_ms())?;
        let raw: RawResponse = self.http.post_json(AUTO_LOGIN_PATH, &body).await?;

        match ResponseEnvelope::from_wire(raw)? {
            ResponseEnvelope::Plain(response) => Ok(response),
            ResponseEnvelope::Sealed(payload) => {
                let plaintext = self.channel.decrypt(&payload)?;
                serde_json::from_slice(&plaintext).map_err(|e| {
                    AppError::ProtocolViolation(format!("decrypted response is not valid JSON: {e}"))
                })
            }
        }
    }

    /// An empty fingerprint means the digest primitive was unavailable;
    /// send nothing rather than an empty string.
    fn fingerprint_or_none(&self) -> Option<String> {
        let fingerprint = self.identity.fingerprint();
        if fingerprint.is_empty() {
            None
        } else {
            Some(fingerprint)
        }
    }
}
