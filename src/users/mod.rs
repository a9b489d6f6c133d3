//! Authentication provider contract.
//!
//! The backend (file, directory, ...) is chosen once at startup and
//! injected as a trait object; the verification logic never sees a
//! concrete variant.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

pub mod file;

pub use self::file::FileUserProvider;

/// Directory data attached to an authenticated user.
#[derive(Debug, Clone, Default)]
pub struct UserDetails {
    pub groups: Vec<String>,
    pub emails: Vec<String>,
}

/// Credential backend.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Check a username/password pair. `Ok(false)` means bad credentials;
    /// an error means the backend itself failed.
    async fn check_user_password(&self, username: &str, password: &SecretString) -> Result<bool>;

    /// Groups and email addresses for a known user.
    async fn get_details(&self, username: &str) -> Result<UserDetails>;

    /// Replace a user's password.
    async fn update_password(&self, username: &str, new_password: &SecretString) -> Result<()>;
}
