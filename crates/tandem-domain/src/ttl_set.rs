use crate::fingerprint::Fingerprint;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// TTL-bounded set of fingerprints.
///
/// The in-flight tracker and the recent-success cache are two independently
/// configured instances of this type. Expired entries read as absent and are
/// evicted opportunistically on access; there is no background timer.
/// Entries do not survive a restart.
pub struct TtlSet {
    ttl: Duration,
    entries: Mutex<HashMap<Fingerprint, Instant>>,
}

impl TtlSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True only while `now - inserted <= ttl`. An expired entry is removed
    /// on the way out.
    pub async fn contains_live(&self, fingerprint: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let live = match entries.get(fingerprint) {
            Some(inserted) => inserted.elapsed() <= self.ttl,
            None => return false,
        };
        if !live {
            entries.remove(fingerprint);
        }
        live
    }

    /// Insert (or refresh) a fingerprint, then sweep expired entries so the
    /// set cannot grow without bound.
    pub async fn insert(&self, fingerprint: Fingerprint) {
        let mut entries = self.entries.lock().await;
        entries.insert(fingerprint, Instant::now());
        let ttl = self.ttl;
        entries.retain(|_, inserted| inserted.elapsed() <= ttl);
    }

    pub async fn remove(&self, fingerprint: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(fingerprint);
    }

    /// Drop every expired entry.
    pub async fn sweep(&self) {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, inserted| inserted.elapsed() <= ttl);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
