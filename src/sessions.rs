use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Transport address plus the client's opaque fingerprint token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub address: String,
    pub token: String,
}

impl SessionKey {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
        }
    }
}

/// Live sessions keyed by [`SessionKey`], expired after `timeout` without a
/// heartbeat.
#[derive(Debug)]
pub struct SessionTracker {
    sessions: HashMap<SessionKey, Instant>,
    timeout: Duration,
}

impl SessionTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    /// Returns true when the key was not already live.
    pub fn heartbeat(&mut self, key: SessionKey, now: Instant) -> bool {
        let fresh = match self.sessions.get(&key) {
            Some(last_seen) => self.expired(*last_seen, now),
            None => true,
        };
        if fresh {
            debug!("session started: {}", redact(&key.address));
        }
        self.sessions.insert(key, now);
        fresh
    }

    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, last_seen| now.saturating_duration_since(*last_seen) <= timeout);
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!("expired {removed} sessions, {} still live", self.sessions.len());
        }
        removed
    }

    /// Live session count, after dropping anything already past the timeout.
    pub fn connected(&mut self, now: Instant) -> usize {
        self.sweep(now);
        self.sessions.len()
    }

    /// Tracked sessions, including any not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    fn expired(&self, last_seen: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_seen) > self.timeout
    }
}

pub(crate) fn redact(identity: &str) -> String {
    let prefix: String = identity.chars().take(8).collect();
    format!("{prefix}...")
}
