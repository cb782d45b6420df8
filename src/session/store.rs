//! Durable session persistence.
//!
//! One session at a time, stored as JSON at a configurable path (default
//! `~/.walletgate/session.json`). This is the crate's equivalent of the
//! dashboard's `jwt` cookie: it survives restarts, is scoped per
//! user profile, and carries a 15-day expiry.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Sessions expire 15 days after issuance, matching the backend's cookie TTL.
pub const SESSION_TTL_DAYS: i64 = 15;

/// An authenticated session for one wallet address.
///
/// Created only by a successful token exchange; never mutated — a new
/// login replaces the record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub address: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Stamp a fresh session issued now with the standard TTL.
    pub fn issued_now(address: String, token: String) -> Self {
        let issued_at = Utc::now();
        Self {
            address,
            token,
            issued_at,
            expires_at: issued_at + chrono::Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// File-backed store holding at most one [`Session`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Persist `session`, replacing any prior entry.
    ///
    /// Writes to a sibling temp file and renames it into place, so a
    /// concurrent reader sees either the old record or the new one, never a
    /// partial write.
    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;

        // Restrictive permissions: the file contains a bearer credential.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Load the stored session, or `None` when absent or expired.
    ///
    /// An unreadable or unparseable file is treated as absent: the protocol
    /// recovers by running a fresh challenge, which overwrites it.
    pub async fn load(&self) -> Option<Session> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed reading session file");
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&data) {
            Ok(session) => session,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unparseable session file");
                return None;
            }
        };

        if session.is_expired_at(Utc::now()) {
            debug!(address = %session.address, "stored session expired");
            return None;
        }
        Some(session)
    }

    /// Remove the stored session. Idempotent.
    pub async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("session.json"))
    }

    #[tokio::test]
    async fn save_then_load_round_trips_until_cleared() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert!(store.load().await.is_none());

        let session = Session::issued_now("0xabc".to_string(), "tok-1".to_string());
        store.save(&session).await.expect("save");
        assert_eq!(store.load().await, Some(session.clone()));

        // Overwrite replaces, never merges.
        let replacement = Session::issued_now("0xabc".to_string(), "tok-2".to_string());
        store.save(&replacement).await.expect("save replacement");
        assert_eq!(store.load().await, Some(replacement));

        store.clear().await.expect("clear");
        assert!(store.load().await.is_none());
        store.clear().await.expect("clear is idempotent");
    }

    #[tokio::test]
    async fn expired_sessions_load_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        let mut session = Session::issued_now("0xabc".to_string(), "tok-1".to_string());
        session.issued_at = Utc::now() - chrono::Duration::days(SESSION_TTL_DAYS + 1);
        session.expires_at = Utc::now() - chrono::Duration::days(1);
        store.save(&session).await.expect("save");

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_files_are_treated_as_absent() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(dir.path().join("session.json"), "{not json").expect("write");

        assert!(store.load().await.is_none());
    }

    #[test]
    fn fresh_sessions_carry_the_standard_ttl() {
        let session = Session::issued_now("0xabc".to_string(), "tok-1".to_string());
        assert_eq!(
            session.expires_at - session.issued_at,
            chrono::Duration::days(SESSION_TTL_DAYS)
        );
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(session.expires_at));
    }
}
