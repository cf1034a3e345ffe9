//! Keyed arena with per-entry expiry.

use crate::{Clock, ConsumeError, StoreError};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A record that may be used at most once.
pub trait Consumable {
    fn is_consumed(&self) -> bool;
    fn mark_consumed(&mut self);
}

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// Keyed arena of ephemeral records.
///
/// An entry is observable only while `now < expires_at`; expired entries are
/// reported as absent by every accessor even before `sweep` reclaims them.
/// All operations on one key run under a single lock, so read-modify-write
/// closures are atomic with respect to each other.
pub struct TtlStore<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl<T> TtlStore<T> {
    /// Create a store that holds at most `max_entries` live records.
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            max_entries,
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// When the arena is at capacity, expired entries are reclaimed first;
    /// if it is still full the insert is refused.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: T,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, StoreError> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let key = key.into();
        let mut entries = self.entries.lock();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.max_entries {
                return Err(StoreError::Full(entries.len()));
            }
        }

        entries.insert(key, Entry { value, expires_at });
        Ok(expires_at)
    }

    /// Read a live entry.
    pub fn get<R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| f(&entry.value))
    }

    /// Mutate a live entry in place.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries
            .get_mut(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| f(&mut entry.value))
    }

    /// Expiry instant of a live entry.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .map(|entry| entry.expires_at)
            .filter(|expires_at| *expires_at > now)
    }

    /// Remove and return a live entry.
    pub fn remove(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.remove(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value),
            _ => None,
        }
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key, |_| ()).is_some()
    }

    /// Reclaim every expired entry. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "Swept expired entries");
        }
        swept
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Consumable + Clone> TtlStore<T> {
    /// Atomically mark the record under `key` as consumed and return it.
    ///
    /// Of any number of concurrent calls for one key, at most one succeeds.
    /// Consumed records stay in the arena until expiry so that a replay is
    /// reported as `AlreadyConsumed` rather than `NotFound`.
    pub fn consume(&self, key: &str) -> Result<T, ConsumeError> {
        self.update(key, |record| {
            if record.is_consumed() {
                Err(ConsumeError::AlreadyConsumed)
            } else {
                record.mark_consumed();
                Ok(record.clone())
            }
        })
        .unwrap_or(Err(ConsumeError::NotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Token {
        value: String,
        consumed: bool,
    }

    impl Consumable for Token {
        fn is_consumed(&self) -> bool {
            self.consumed
        }

        fn mark_consumed(&mut self) {
            self.consumed = true;
        }
    }

    fn token(value: &str) -> Token {
        Token {
            value: value.to_string(),
            consumed: false,
        }
    }

    fn store_with_clock(max: usize) -> (TtlStore<Token>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (TtlStore::new(clock.clone(), max), clock)
    }

    #[test]
    fn test_insert_and_get() {
        let (store, _) = store_with_clock(10);
        store.insert("a", token("a"), Duration::minutes(5)).unwrap();
        assert_eq!(store.get("a", |t| t.value.clone()), Some("a".to_string()));
        assert!(store.get("missing", |t| t.value.clone()).is_none());
    }

    #[test]
    fn test_entry_invisible_at_expiry_before_sweep() {
        let (store, clock) = store_with_clock(10);
        store.insert("a", token("a"), Duration::seconds(60)).unwrap();

        clock.advance(Duration::seconds(59));
        assert!(store.contains("a"));

        clock.advance(Duration::seconds(1));
        assert!(!store.contains("a"));
        assert!(store.update("a", |t| t.consumed = true).is_none());
        assert!(store.remove("a").is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_sweep_reclaims_only_expired() {
        let (store, clock) = store_with_clock(10);
        store.insert("short", token("s"), Duration::seconds(10)).unwrap();
        store.insert("long", token("l"), Duration::seconds(100)).unwrap();

        clock.advance(Duration::seconds(30));
        assert_eq!(store.sweep(), 1);
        assert!(store.contains("long"));
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn test_consume_exactly_once() {
        let (store, _) = store_with_clock(10);
        store.insert("c", token("c"), Duration::minutes(5)).unwrap();

        assert!(store.consume("c").is_ok());
        assert_eq!(store.consume("c"), Err(ConsumeError::AlreadyConsumed));
    }

    #[test]
    fn test_consume_missing_or_expired() {
        let (store, clock) = store_with_clock(10);
        assert_eq!(store.consume("nope"), Err(ConsumeError::NotFound));

        store.insert("c", token("c"), Duration::seconds(5)).unwrap();
        clock.advance(Duration::seconds(5));
        assert_eq!(store.consume("c"), Err(ConsumeError::NotFound));
    }

    #[test]
    fn test_concurrent_consume_single_winner() {
        let store = Arc::new(TtlStore::new(Arc::new(crate::SystemClock), 10));
        store.insert("race", token("race"), Duration::minutes(5)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.consume("race").is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_capacity_reclaims_expired_before_refusing() {
        let (store, clock) = store_with_clock(2);
        store.insert("a", token("a"), Duration::seconds(10)).unwrap();
        store.insert("b", token("b"), Duration::seconds(100)).unwrap();

        assert_eq!(
            store.insert("c", token("c"), Duration::seconds(10)),
            Err(StoreError::Full(2))
        );

        clock.advance(Duration::seconds(20));
        assert!(store.insert("c", token("c"), Duration::seconds(10)).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replacing_existing_key_at_capacity() {
        let (store, _) = store_with_clock(1);
        store.insert("a", token("a"), Duration::seconds(10)).unwrap();
        assert!(store.insert("a", token("a2"), Duration::seconds(10)).is_ok());
        assert_eq!(store.get("a", |t| t.value.clone()), Some("a2".to_string()));
    }
}
