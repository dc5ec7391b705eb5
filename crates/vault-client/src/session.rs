//! Persisted session state.
//!
//! A [`Session`] is the record the backend returns on login: an access token,
//! a refresh token, and an opaque user snapshot. The [`SessionStore`] keeps it
//! under a single storage key and always reads and writes it as a whole.
//!
//! A session is either complete (both tokens non-empty) or absent. Anything
//! else found in storage is treated as corruption: it is deleted and the
//! caller sees "no session".

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vault_storage::{StorageBackend, StorageError};

use crate::error::ClientError;

/// An authenticated session as persisted in client-local storage.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Short-lived bearer credential.
    #[serde(rename = "accesstoken", default)]
    pub access_token: String,
    /// Longer-lived credential used only to mint a new access token.
    #[serde(rename = "refreshtoken", default)]
    pub refresh_token: String,
    /// Profile and roles snapshot; opaque to the client.
    #[serde(default)]
    pub user: Value,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    /// Create a session from its parts.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: Value,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user,
        }
    }

    /// Check that both tokens are present.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IncompleteSession`] naming the first missing token.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.access_token.is_empty() {
            return Err(ClientError::IncompleteSession {
                field: "accesstoken",
            });
        }
        if self.refresh_token.is_empty() {
            return Err(ClientError::IncompleteSession {
                field: "refreshtoken",
            });
        }
        Ok(())
    }

    /// Return the session that results from a successful refresh.
    ///
    /// The refresh token is replaced only when the backend rotated it.
    #[must_use]
    pub fn with_rotated_tokens(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            user: self.user.clone(),
        }
    }

    /// Role names carried in the user snapshot.
    ///
    /// Accepts `user.roles` as an array of strings or of objects with a
    /// `name` field, and a single `user.role` string.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self
            .user
            .get("roles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| {
                        r.as_str()
                            .or_else(|| r.get("name").and_then(Value::as_str))
                            .map(str::to_owned)
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(role) = self.user.get("role").and_then(Value::as_str) {
            if !roles.iter().any(|r| r == role) {
                roles.push(role.to_owned());
            }
        }
        roles
    }

    /// Whether the user holds `role` (case-insensitive).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Whether the user holds at least one of `roles`.
    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        let held = self.roles();
        roles
            .iter()
            .any(|want| held.iter().any(|r| r.eq_ignore_ascii_case(want)))
    }

    /// A human-readable name for the user, if the snapshot has one.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["name", "username", "email"]
            .iter()
            .find_map(|field| self.user.get(*field).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of [`SessionStore::rotate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rotation {
    /// The refreshed tokens were written over the session they came from.
    Applied(Session),
    /// A different session was stored while the refresh was in flight. It
    /// was left in place and is returned unchanged.
    Superseded(Session),
    /// The session was removed while the refresh was in flight. Nothing was
    /// written.
    SignedOut,
}

enum Record {
    Absent,
    Valid(Session),
    Malformed(String),
}

/// Reads and writes the [`Session`] record in a storage backend.
///
/// Writes are serialized, so a refresh that finishes late cannot overwrite a
/// login or logout that happened while it was in flight.
///
/// Cloning is cheap; clones share the same backend and write lock.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn StorageBackend>,
    key: Arc<str>,
    write_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store that keeps the session under `key` in `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, key: impl Into<Arc<str>>) -> Self {
        Self {
            storage,
            key: key.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn read_record(&self) -> Result<Record, StorageError> {
        let Some(bytes) = self.storage.get(&self.key).await? else {
            return Ok(Record::Absent);
        };
        let parsed = serde_json::from_slice::<Session>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|s| s.validate().map(|()| s).map_err(|e| e.to_string()));
        Ok(match parsed {
            Ok(session) => Record::Valid(session),
            Err(reason) => Record::Malformed(reason),
        })
    }

    /// Load the persisted session, surfacing storage read errors.
    ///
    /// A record that does not decode into a complete session is deleted and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// Returns the [`StorageError`] if the backend read fails. The record is
    /// left untouched in that case.
    pub async fn try_load(&self) -> Result<Option<Session>, StorageError> {
        match self.read_record().await? {
            Record::Absent => Ok(None),
            Record::Valid(session) => Ok(Some(session)),
            Record::Malformed(reason) => {
                warn!(key = %self.key, reason = %reason, "discarding malformed session record");
                let _guard = self.write_lock.lock().await;
                // A login may have replaced the record since it was read.
                if matches!(self.read_record().await, Ok(Record::Malformed(_))) {
                    if let Err(e) = self.storage.delete(&self.key).await {
                        warn!(
                            key = %self.key,
                            error = %e,
                            "failed to remove malformed session record"
                        );
                    }
                }
                Ok(None)
            }
        }
    }

    /// Load the persisted session.
    ///
    /// Never fails. A record that does not decode into a complete session is
    /// deleted and reported as absent; a storage read error is logged and
    /// also reported as absent.
    pub async fn load(&self) -> Option<Session> {
        self.try_load().await.unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "failed to read session, continuing without one");
            None
        })
    }

    /// The current access token, if a session is stored.
    pub async fn access_token(&self) -> Option<String> {
        self.load().await.map(|s| s.access_token)
    }

    /// The current refresh token, if a session is stored.
    pub async fn refresh_token(&self) -> Option<String> {
        self.load().await.map(|s| s.refresh_token)
    }

    async fn write(&self, session: &Session) -> Result<(), ClientError> {
        session.validate()?;
        let bytes = serde_json::to_vec(session)?;
        self.storage.put(&self.key, &bytes).await?;
        debug!(key = %self.key, "session persisted");
        Ok(())
    }

    /// Persist `session`, replacing any existing record in a single write.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IncompleteSession`] if either token is empty,
    /// [`ClientError::Json`] if serialization fails, or
    /// [`ClientError::Storage`] if the backend write fails.
    pub async fn save(&self, session: &Session) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        self.write(session).await
    }

    /// Apply refreshed tokens, but only to the session they were minted for.
    ///
    /// `presented` is the refresh token that was sent to the backend. The
    /// record is rewritten only if it still carries that refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the backend read or write fails,
    /// or [`ClientError::IncompleteSession`] if `access_token` is empty.
    pub async fn rotate(
        &self,
        presented: &str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Rotation, ClientError> {
        let _guard = self.write_lock.lock().await;
        match self.read_record().await? {
            Record::Valid(current) if current.refresh_token == presented => {
                let session = current.with_rotated_tokens(access_token, refresh_token);
                self.write(&session).await?;
                Ok(Rotation::Applied(session))
            }
            Record::Valid(other) => Ok(Rotation::Superseded(other)),
            Record::Absent | Record::Malformed(_) => Ok(Rotation::SignedOut),
        }
    }

    /// Remove the persisted session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the backend delete fails.
    pub async fn clear(&self) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        self.storage.delete(&self.key).await?;
        debug!(key = %self.key, "session cleared");
        Ok(())
    }
}
