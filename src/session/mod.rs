//! Session model and store contract.
//!
//! Sessions follow a load, mutate-local-copy, save protocol: the decision
//! logic reads a session once, changes its own copy, and writes it back in
//! one call. The store serializes access internally.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::authz::types::AuthenticationLevel;

/// Per-client authentication state carried by the proxy cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub groups: Vec<String>,
    pub emails: Vec<String>,
    pub authentication_level: AuthenticationLevel,
    /// Unix seconds of the last authorized activity.
    pub last_activity: i64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            username: String::new(),
            groups: Vec::new(),
            emails: Vec::new(),
            authentication_level: AuthenticationLevel::NotAuthenticated,
            last_activity: 0,
        }
    }
}

impl Session {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// True when an inactivity limit is set and exceeded.
    #[must_use]
    pub fn expired_by_inactivity(&self, inactivity_seconds: i64, now: i64) -> bool {
        inactivity_seconds > 0 && now - self.last_activity > inactivity_seconds
    }
}

/// Session backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for a cookie token. `Ok(None)` when the token is
    /// unknown or the stored session has outlived [`Self::expiration`].
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    async fn save(&self, token: &str, session: Session) -> Result<()>;

    async fn destroy(&self, token: &str) -> Result<()>;

    /// Absolute lifetime granted to stored sessions.
    fn expiration(&self) -> Duration;
}

/// Create a new session token for the auth cookie.
/// The raw value only travels in the cookie; stores key by hash.
///
/// # Errors
/// Returns an error when the system RNG fails.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never sit in the store.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

struct StoredSession {
    session: Session,
    stored_at: i64,
}

/// In-process session store keyed by token hash, with lazy expiry.
pub struct MemorySessionStore {
    expiration: Duration,
    sessions: Mutex<HashMap<Vec<u8>, StoredSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(expiration: Duration) -> Self {
        Self {
            expiration,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn expired(&self, stored_at: i64, now: i64) -> bool {
        let lifetime = i64::try_from(self.expiration.as_secs()).unwrap_or(i64::MAX);
        now - stored_at > lifetime
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let now = Utc::now().timestamp();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, stored| !self.expired(stored.stored_at, now));
        Ok(sessions
            .get(&hash_token(token))
            .map(|stored| stored.session.clone()))
    }

    async fn save(&self, token: &str, session: Session) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            hash_token(token),
            StoredSession {
                session,
                stored_at: Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&hash_token(token));
        Ok(())
    }

    fn expiration(&self) -> Duration {
        self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_session(username: &str) -> Session {
        Session {
            username: username.to_string(),
            groups: vec!["dev".to_string()],
            emails: vec![format!("{username}@example.com")],
            authentication_level: AuthenticationLevel::OneFactor,
            last_activity: Utc::now().timestamp(),
        }
    }

    #[test]
    fn generated_tokens_are_unique_and_opaque() -> Result<()> {
        let first = generate_token()?;
        let second = generate_token()?;
        assert_ne!(first, second);
        assert_eq!(URL_SAFE_NO_PAD.decode(first.as_bytes())?.len(), 32);
        Ok(())
    }

    #[test]
    fn hash_token_is_stable() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
    }

    #[test]
    fn inactivity_zero_disables_expiry() {
        let session = Session {
            last_activity: 0,
            ..Session::default()
        };
        assert!(!session.expired_by_inactivity(0, i64::MAX));
    }

    #[test]
    fn inactivity_expiry_boundary() {
        let session = Session {
            last_activity: 1_000,
            ..Session::default()
        };
        assert!(!session.expired_by_inactivity(300, 1_300));
        assert!(session.expired_by_inactivity(300, 1_301));
    }

    #[tokio::test]
    async fn save_get_destroy_round_trip() -> Result<()> {
        let store = MemorySessionStore::new(Duration::from_secs(3600));
        let token = generate_token()?;

        assert!(store.get(&token).await?.is_none());

        store.save(&token, named_session("john")).await?;
        let loaded = store.get(&token).await?.expect("session should exist");
        assert_eq!(loaded.username, "john");
        assert_eq!(loaded.authentication_level, AuthenticationLevel::OneFactor);

        store.destroy(&token).await?;
        assert!(store.get(&token).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_are_evicted_on_get() -> Result<()> {
        let store = MemorySessionStore::new(Duration::from_secs(0));
        let token = generate_token()?;
        store.save(&token, named_session("john")).await?;

        // stored_at is "now" and the lifetime is zero, so anything older
        // than the current second is gone; poke stored_at backwards.
        {
            let mut sessions = store.sessions.lock().await;
            for stored in sessions.values_mut() {
                stored.stored_at -= 10;
            }
        }
        assert!(store.get(&token).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn destroy_unknown_token_is_a_noop() -> Result<()> {
        let store = MemorySessionStore::new(Duration::from_secs(3600));
        store.destroy("missing").await?;
        Ok(())
    }
}
