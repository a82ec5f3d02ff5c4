//! Expiry-aware reads and writes of user and device credentials.
//!
//! Expired tokens are deleted eagerly on read, inside the same
//! transaction as the read that discovered the expiry, rather than swept
//! proactively.

use rwp_crypto::current_timestamp_ms;

use crate::error::AppError;
use crate::infra::store::{context_keys, user_key, user_keys, KvStore, Partition};
use crate::protocol::{AutoLoginResponse, TokenRecord};

/// Credentials eligible for an auto-login attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user_id: String,
    pub user_token: String,
    pub device_id: Option<String>,
    pub device_token: Option<String>,
}

/// Load the remembered user's credentials, pruning expired tokens.
///
/// One read-write transaction spans the `user` and `context` partitions so
/// the delete of an expired entry commits atomically with the read.
/// Returns `None` when there is no remembered user, no user token, or an
/// expired one. The device token is read only when a device id exists.
pub fn load_candidate(store: &KvStore) -> Result<Option<Candidate>, AppError> {
    let now = current_timestamp_ms();

    store.transaction(|txn| {
        let Some(user_id) =
            txn.get_json::<String>(Partition::Context, context_keys::LAST_LOGIN_UID)
        else {
            return Ok(None);
        };

        let token_key = user_key(&user_id, user_keys::USER_TOKEN);
        let Some(user_token) = txn.get_json::<TokenRecord>(Partition::User, &token_key) else {
            return Ok(None);
        };
        if !user_token.is_usable(now) {
            txn.delete(Partition::User, &token_key);
            return Ok(None);
        }

        let device_id = txn.get_json::<String>(Partition::Context, context_keys::DEVICE_ID);

        let mut device_token = None;
        if device_id.is_some() {
            if let Some(record) =
                txn.get_json::<TokenRecord>(Partition::Context, context_keys::DEVICE_TOKEN)
            {
                if record.is_usable(now) {
                    device_token = Some(record.token);
                } else {
                    txn.delete(Partition::Context, context_keys::DEVICE_TOKEN);
                }
            }
        }

        Ok(Some(Candidate {
            user_id,
            user_token: user_token.token,
            device_id,
            device_token,
        }))
    })
}

/// Persist what a successful login handed back, in one transaction.
///
/// A returned device id equal to the one already held is not rewritten.
/// The device token, when present, gets exactly one put.
pub fn persist_login(
    store: &KvStore,
    user_id: &str,
    held_device_id: Option<&str>,
    response: &AutoLoginResponse,
) -> Result<(), AppError> {
    store.transaction(|txn| {
        if let Some(id) = &response.device_id {
            if held_device_id != Some(id.as_str()) {
                txn.put_json(Partition::Context, context_keys::DEVICE_ID, id)?;
            }
        }
        if let Some(token) = &response.device_token {
            txn.put_json(Partition::Context, context_keys::DEVICE_TOKEN, token)?;
        }
        if !response.username.is_empty() {
            txn.put_json(
                Partition::User,
                &user_key(user_id, user_keys::USERNAME),
                &response.username,
            )?;
        }
        Ok(())
    })
}

/// Record the last-login user id so the next visit can attempt auto-login.
pub fn remember_login(store: &KvStore, user_id: &str) -> Result<(), AppError> {
    store.put_json(Partition::Context, context_keys::LAST_LOGIN_UID, &user_id)
}

/// Drop the stored device token (it was rejected by the server).
pub fn forget_device_token(store: &KvStore) -> Result<(), AppError> {
    store.delete(Partition::Context, context_keys::DEVICE_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FUTURE_MS: u64 = 4_102_444_800_000; // 2100-01-01

    fn seeded_store() -> KvStore {
        let store = KvStore::in_memory();
        remember_login(&store, "u-1").unwrap();
        store
            .put_json(
                Partition::User,
                &user_key("u-1", user_keys::USER_TOKEN),
                &TokenRecord {
                    token: "user-tok".into(),
                    expires_at: FUTURE_MS,
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn no_remembered_user_yields_none() {
        let store = KvStore::in_memory();
        assert!(load_candidate(&store).unwrap().is_none());
    }

    #[test]
    fn candidate_without_device_credentials() {
        let store = seeded_store();
        let candidate = load_candidate(&store).unwrap().unwrap();
        assert_eq!(candidate.user_id, "u-1");
        assert_eq!(candidate.user_token, "user-tok");
        assert!(candidate.device_id.is_none());
        assert!(candidate.device_token.is_none());
    }

    #[test]
    fn expired_user_token_is_deleted_in_same_transaction() {
        let store = KvStore::in_memory();
        remember_login(&store, "u-1").unwrap();
        let token_key = user_key("u-1", user_keys::USER_TOKEN);
        store
            .put_json(
                Partition::User,
                &token_key,
                &TokenRecord {
                    token: "stale".into(),
                    expires_at: 1_000, // long past
                },
            )
            .unwrap();

        assert!(load_candidate(&store).unwrap().is_none());
        assert!(
            store.get(Partition::User, &token_key).is_none(),
            "expired token must be gone after the read that found it"
        );
    }

    #[test]
    fn expired_device_token_is_pruned_but_candidate_survives() {
        let store = seeded_store();
        store
            .put_json(Partition::Context, context_keys::DEVICE_ID, &"dev-1")
            .unwrap();
        store
            .put_json(
                Partition::Context,
                context_keys::DEVICE_TOKEN,
                &TokenRecord {
                    token: "stale".into(),
                    expires_at: 1_000,
                },
            )
            .unwrap();

        let candidate = load_candidate(&store).unwrap().unwrap();
        assert_eq!(candidate.device_id.as_deref(), Some("dev-1"));
        assert!(candidate.device_token.is_none());
        assert!(store.get(Partition::Context, context_keys::DEVICE_TOKEN).is_none());
    }

    #[test]
    fn device_token_ignored_without_device_id() {
        let store = seeded_store();
        store
            .put_json(
                Partition::Context,
                context_keys::DEVICE_TOKEN,
                &TokenRecord {
                    token: "orphan".into(),
                    expires_at: FUTURE_MS,
                },
            )
            .unwrap();

        let candidate = load_candidate(&store).unwrap().unwrap();
        assert!(candidate.device_token.is_none());
        // Not deleted either: it was never read
        assert!(store.get(Partition::Context, context_keys::DEVICE_TOKEN).is_some());
    }

    #[test]
    fn persist_login_skips_unchanged_device_id() {
        let store = seeded_store();
        store
            .put(Partition::Context, context_keys::DEVICE_ID, json!("dev-1"))
            .unwrap();

        let response = AutoLoginResponse {
            code: crate::protocol::LoginStatus::SUCCESS,
            username: "ada".into(),
            device_id: Some("dev-1".into()),
            device_token: Some(TokenRecord {
                token: "fresh".into(),
                expires_at: FUTURE_MS,
            }),
            error_message: None,
        };
        persist_login(&store, "u-1", Some("dev-1"), &response).unwrap();

        let stored: TokenRecord = store
            .get_json(Partition::Context, context_keys::DEVICE_TOKEN)
            .unwrap();
        assert_eq!(stored.token, "fresh");
        assert_eq!(
            store.get_json::<String>(Partition::User, &user_key("u-1", user_keys::USERNAME)),
            Some("ada".to_string())
        );
    }

    #[test]
    fn persist_login_writes_new_device_id() {
        let store = seeded_store();
        let response = AutoLoginResponse {
            code: crate::protocol::LoginStatus::SUCCESS,
            username: String::new(),
            device_id: Some("dev-9".into()),
            device_token: None,
            error_message: None,
        };
        persist_login(&store, "u-1", None, &response).unwrap();
        assert_eq!(
            store.get_json::<String>(Partition::Context, context_keys::DEVICE_ID),
            Some("dev-9".to_string())
        );
    }
}
