use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by identity.
///
/// At most `capacity` identities are tracked. When a new identity arrives at
/// capacity, expired windows are evicted first, then the oldest window.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, Window>,
    window: Duration,
    limit: u32,
    capacity: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, limit: u32, capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window,
            limit: limit.max(1),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when `identity` has used up its current window.
    pub fn check(&mut self, identity: &str, now: Instant) -> bool {
        if let Some(entry) = self.windows.get_mut(identity) {
            if now.saturating_duration_since(entry.start) >= self.window {
                *entry = Window { start: now, count: 1 };
                return true;
            }
            if entry.count >= self.limit {
                return false;
            }
            entry.count += 1;
            return true;
        }

        if self.windows.len() >= self.capacity {
            self.evict(now);
        }
        self.windows
            .insert(identity.to_string(), Window { start: now, count: 1 });
        true
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        let window = self.window;
        self.windows
            .retain(|_, entry| now.saturating_duration_since(entry.start) < window);
        if self.windows.len() < self.capacity {
            return;
        }
        let oldest = self
            .windows
            .iter()
            .min_by_key(|(_, entry)| entry.start)
            .map(|(identity, _)| identity.clone());
        if let Some(identity) = oldest {
            self.windows.remove(&identity);
        }
    }
}
