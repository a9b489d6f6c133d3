//! Brute-force regulation for the first-factor flow.
//!
//! Verification never consults the regulator; only login attempts do.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Ban bookkeeping keyed by username.
#[async_trait]
pub trait Regulator: Send + Sync {
    /// Record the outcome of an authentication attempt.
    async fn mark(&self, username: &str, successful: bool);

    /// Returns the unix-seconds ban expiry when the user is currently
    /// banned, `None` otherwise.
    async fn regulate(&self, username: &str) -> Result<Option<i64>>;
}

/// Regulator that never bans.
#[derive(Clone, Debug)]
pub struct NoopRegulator;

#[async_trait]
impl Regulator for NoopRegulator {
    async fn mark(&self, _username: &str, _successful: bool) {}

    async fn regulate(&self, _username: &str) -> Result<Option<i64>> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct AttemptRecord {
    /// Unix seconds of recent failed attempts inside the window.
    failures: Vec<i64>,
    banned_until: Option<i64>,
}

/// In-process sliding-window regulator: `max_retries` failures within
/// `find_time` seconds ban the username for `ban_time` seconds.
pub struct MemoryRegulator {
    max_retries: usize,
    find_time: i64,
    ban_time: i64,
    records: Mutex<HashMap<String, AttemptRecord>>,
}

impl MemoryRegulator {
    #[must_use]
    pub fn new(max_retries: u32, find_time: i64, ban_time: i64) -> Self {
        Self {
            max_retries: max_retries as usize,
            find_time,
            ban_time,
            records: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Regulator for MemoryRegulator {
    async fn mark(&self, username: &str, successful: bool) {
        let now = Utc::now().timestamp();
        let mut records = self.records.lock().await;

        if successful {
            // A successful login clears the slate.
            records.remove(username);
            return;
        }

        let record = records.entry(username.to_string()).or_default();
        record.failures.push(now);
        record
            .failures
            .retain(|&stamp| now - stamp <= self.find_time);
        if record.failures.len() >= self.max_retries {
            record.banned_until = Some(now + self.ban_time);
            record.failures.clear();
        }
    }

    async fn regulate(&self, username: &str) -> Result<Option<i64>> {
        let now = Utc::now().timestamp();
        let mut records = self.records.lock().await;

        let Some(record) = records.get_mut(username) else {
            return Ok(None);
        };
        match record.banned_until {
            Some(until) if until > now => Ok(Some(until)),
            Some(_) => {
                // Ban expired; forget it.
                record.banned_until = None;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
