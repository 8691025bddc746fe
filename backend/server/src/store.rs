//! # Session Store
//!
//! Opaque key-value storage for one serialized session document per device.
//!
//! Sessions only live in memory, a restart starts every device from scratch. A device
//! that has not been seen for the configured TTL is forgotten, swept on the next write.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, document: Value);
}

struct Entry {
    document: Value,
    last_seen: Instant,
}

pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(key)?;

        if entry.last_seen.elapsed() >= self.ttl {
            sessions.remove(key);
            return None;
        }

        entry.last_seen = Instant::now();

        Some(entry.document.clone())
    }

    async fn set(&self, key: &str, document: Value) {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < self.ttl);
        if sessions.len() < before {
            debug!(
                "Evicted {} idle sessions, {} left",
                before - sessions.len(),
                sessions.len()
            );
        }

        sessions.insert(
            key.to_string(),
            Entry {
                document,
                last_seen: now,
            },
        );
    }
}
