//! # rwp-client
//!
//! The RWP auto-login client agent: re-authenticates against the backend
//! with stored credentials, engaging an application-layer encrypted
//! channel (ECDH → HKDF → AES-GCM) whenever the transport itself is not
//! already trusted.
//!
//! The usual flow:
//!
//! ```no_run
//! use std::sync::Arc;
//! use rwp_client::{AgentConfig, AutoLoginAgent, AutoLoginOutcome, KvStore};
//!
//! # async fn run() {
//! let store = Arc::new(KvStore::open_or_ephemeral("/var/lib/rwp/store.json"));
//! let config = AgentConfig::new("https://portal.example.com", "rwp", "1.4.0");
//! let agent = AutoLoginAgent::new(config, store).expect("agent");
//!
//! match agent.auto_login().await {
//!     AutoLoginOutcome::Success { username, .. } => { /* session established */ }
//!     AutoLoginOutcome::NoCredentials | AutoLoginOutcome::Failed { .. } => {
//!         // fall through to the manual login path
//!     }
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod infra;
pub mod protocol;
pub mod service;
pub mod trust;

pub use device::{DeviceIdentity, DisplayMetrics, EnvSnapshot};
pub use error::AppError;
pub use infra::store::{context_keys, prefs_keys, user_key, user_keys, KvStore, Partition};
pub use protocol::{AutoLoginResponse, LoginStatus, TokenRecord};
pub use service::auto_login::{AgentConfig, AutoLoginAgent, AutoLoginOutcome};
pub use service::channel::SessionChannel;
pub use service::tokens::{load_candidate, remember_login, Candidate};
pub use trust::{is_transport_trusted, TransportTrust};
