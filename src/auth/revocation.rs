//! Token Revocation Store
//! Mission: Reject logged-out tokens until they would have expired anyway

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// In-memory revocation list keyed by the raw token string.
///
/// Every read and write goes through the same lock, so a `revoke` is visible
/// to any `is_revoked` that starts after it returns.
#[derive(Default)]
pub struct RevocationStore {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token` as revoked until `expires_at`.
    ///
    /// Returns `false` when the token was already revoked; the stored expiry is
    /// left untouched in that case.
    pub fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(token) {
            return false;
        }
        entries.insert(token.to_string(), expires_at);
        true
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.entries.read().contains_key(token)
    }

    /// Drop every entry whose natural expiry is at or before `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run `sweep` every `every` until the runtime shuts down.
    pub fn spawn_sweeper(store: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🧹 Revocation sweeper running every {:?}", every);

            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.sweep(Utc::now());
                if purged > 0 {
                    debug!(purged, remaining = store.len(), "Swept expired revocations");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::thread;

    #[test]
    fn test_revoke_is_idempotent() {
        let store = RevocationStore::new();
        let expires_at = Utc::now() + ChronoDuration::minutes(5);

        assert!(!store.is_revoked("t1"));
        assert!(store.revoke("t1", expires_at));
        assert!(store.is_revoked("t1"));

        assert!(!store.revoke("t1", expires_at + ChronoDuration::minutes(5)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = RevocationStore::new();
        let now = Utc::now();

        store.revoke("past", now - ChronoDuration::seconds(1));
        store.revoke("boundary", now);
        store.revoke("future", now + ChronoDuration::seconds(1));

        assert_eq!(store.sweep(now), 2);
        assert!(!store.is_revoked("past"));
        assert!(!store.is_revoked("boundary"));
        assert!(store.is_revoked("future"));

        assert_eq!(store.sweep(now), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_revocations_are_visible() {
        let store = Arc::new(RevocationStore::new());
        let expires_at = Utc::now() + ChronoDuration::minutes(5);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let token = format!("w{}-t{}", worker, i);
                        store.revoke(&token, expires_at);
                        assert!(store.is_revoked(&token));
                    }
                })
            })
            .collect();

        // Sweeping concurrently must not drop live entries.
        for _ in 0..50 {
            store.sweep(Utc::now());
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let store = Arc::new(RevocationStore::new());
        store.revoke("stale", Utc::now() - ChronoDuration::seconds(1));
        store.revoke("live", Utc::now() + ChronoDuration::hours(1));

        let handle = RevocationStore::spawn_sweeper(store.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!store.is_revoked("stale"));
        assert!(store.is_revoked("live"));
        handle.abort();
    }
}
