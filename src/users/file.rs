//! File-backed user provider.
//!
//! The users file is YAML mapping each username to an Argon2 PHC password
//! hash, a group list, and an optional email address:
//!
//! ```yaml
//! users:
//!   john:
//!     password: "$argon2id$v=19$m=19456,t=2,p=1$..."
//!     groups:
//!       - admins
//!     email: john@example.com
//! ```

use anyhow::{anyhow, bail, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{UserDetails, UserProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserEntry {
    password: String,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, UserEntry>,
}

/// Users loaded from a YAML file at startup.
pub struct FileUserProvider {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserEntry>>,
}

impl FileUserProvider {
    /// Load the users file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read users file {}", path.display()))?;
        let file: UsersFile = serde_yaml::from_str(&raw).context("failed to parse users file")?;

        Ok(Self {
            path: path.to_path_buf(),
            users: RwLock::new(file.users),
        })
    }

    fn hash_password(password: &SecretString) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }
}

#[async_trait]
impl UserProvider for FileUserProvider {
    async fn check_user_password(&self, username: &str, password: &SecretString) -> Result<bool> {
        let users = self.users.read().await;
        let Some(entry) = users.get(username) else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(&entry.password)
            .map_err(|err| anyhow!("malformed password hash for user {username}: {err}"))?;

        Ok(Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok())
    }

    async fn get_details(&self, username: &str) -> Result<UserDetails> {
        let users = self.users.read().await;
        let Some(entry) = users.get(username) else {
            bail!("unknown user {username}");
        };

        Ok(UserDetails {
            groups: entry.groups.clone(),
            emails: entry.email.clone().into_iter().collect(),
        })
    }

    async fn update_password(&self, username: &str, new_password: &SecretString) -> Result<()> {
        let hash = Self::hash_password(new_password)?;

        let mut users = self.users.write().await;
        let Some(entry) = users.get_mut(username) else {
            bail!("unknown user {username}");
        };
        entry.password = hash;

        // Write-back keeps the file authoritative across restarts.
        let serialized = serde_yaml::to_string(&UsersFile {
            users: users.clone(),
        })
        .context("failed to serialize users file")?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write users file {}", self.path.display()))?;

        Ok(())
    }
}
