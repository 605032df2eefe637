//! likebot-storage: the subscription ledger.
//!
//! Holds the subscribed users and the likes each received in the current
//! cycle. The ledger is the only writer of subscription data; every mutation
//! is flushed through a [`LedgerSink`] before the call returns.

use std::sync::{Arc, Mutex, MutexGuard};

use likebot_config::{ConfigError, ConfigStore};
use likebot_types::SubscriptionRecord;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Persist failed: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable destination for the ledger's records.
pub trait LedgerSink: Send + Sync {
    /// Records persisted so far. Sinks without history start empty.
    fn load(&self) -> Result<Vec<SubscriptionRecord>> {
        Ok(Vec::new())
    }

    /// Replace the persisted records with `records` and flush synchronously.
    fn save(&self, records: &[SubscriptionRecord]) -> Result<()>;
}

impl LedgerSink for ConfigStore {
    fn load(&self) -> Result<Vec<SubscriptionRecord>> {
        Ok(self.read().subscribe_data)
    }

    fn save(&self, records: &[SubscriptionRecord]) -> Result<()> {
        self.update(|cfg| cfg.subscribe_data = records.to_vec());
        ConfigStore::save(self)?;
        Ok(())
    }
}

/// Subscribers and their per-cycle like counters.
pub struct SubscriptionLedger {
    records: Mutex<Vec<SubscriptionRecord>>,
    sink: Arc<dyn LedgerSink>,
}

impl SubscriptionLedger {
    /// Create a ledger over `records`, persisting through `sink`.
    pub fn new(records: Vec<SubscriptionRecord>, sink: Arc<dyn LedgerSink>) -> Self {
        Self {
            records: Mutex::new(records),
            sink,
        }
    }

    /// Create a ledger from whatever `sink` has persisted.
    pub fn load(sink: Arc<dyn LedgerSink>) -> Result<Self> {
        let records = sink.load()?;
        tracing::info!("Loaded {} subscriptions", records.len());
        Ok(Self::new(records, sink))
    }

    /// Create a ledger from the `subscribe_data` of a config store, persisting back into it.
    pub fn from_config(store: Arc<ConfigStore>) -> Self {
        let records = store.read().subscribe_data;
        tracing::info!("Loaded {} subscriptions", records.len());
        Self::new(records, store)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SubscriptionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Queries ───────────────────────────────────

    pub fn has(&self, user_id: &str) -> bool {
        self.lock().iter().any(|r| r.user_id == user_id)
    }

    /// Subscriber ids in storage order.
    pub fn all_user_ids(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.user_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Likes received this cycle, or `None` if not subscribed.
    pub fn like_count(&self, user_id: &str) -> Option<u64> {
        self.lock()
            .iter()
            .find(|r| r.user_id == user_id)
            .map(|r| r.like_count)
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        self.lock().clone()
    }

    // ─── Mutations ───────────────────────────────────

    /// Subscribe `user_id`. Returns `false` without writing if already subscribed.
    pub fn add(&self, user_id: &str) -> Result<bool> {
        let mut records = self.lock();
        if records.iter().any(|r| r.user_id == user_id) {
            return Ok(false);
        }
        records.push(SubscriptionRecord::new(user_id));
        self.sink.save(&records)?;
        Ok(true)
    }

    /// Unsubscribe `user_id`. Returns `false` if it was not subscribed.
    pub fn remove(&self, user_id: &str) -> Result<bool> {
        let mut records = self.lock();
        let Some(pos) = records.iter().position(|r| r.user_id == user_id) else {
            return Ok(false);
        };
        records.remove(pos);
        self.sink.save(&records)?;
        Ok(true)
    }

    /// Add `amount` to the user's counter. Unknown users are ignored.
    pub fn increase(&self, user_id: &str, amount: u64) -> Result<()> {
        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| r.user_id == user_id) else {
            return Ok(());
        };
        record.like_count += amount;
        self.sink.save(&records)
    }

    /// Zero every counter. Persists once.
    pub fn reset_all(&self) -> Result<()> {
        let mut records = self.lock();
        for record in records.iter_mut() {
            record.like_count = 0;
        }
        self.sink.save(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySink {
        saves: AtomicUsize,
        last: Mutex<Vec<SubscriptionRecord>>,
    }

    impl LedgerSink for MemorySink {
        fn save(&self, records: &[SubscriptionRecord]) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = records.to_vec();
            Ok(())
        }
    }

    struct FailingSink;

    impl LedgerSink for FailingSink {
        fn save(&self, _records: &[SubscriptionRecord]) -> Result<()> {
            Err(StorageError::Persist("disk full".into()))
        }
    }

    fn ledger() -> (SubscriptionLedger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (SubscriptionLedger::new(Vec::new(), sink.clone()), sink)
    }

    #[test]
    fn test_ledger_scenario() {
        let (ledger, sink) = ledger();

        assert!(ledger.add("u1").unwrap());
        assert!(!ledger.add("u1").unwrap());
        assert_eq!(ledger.all_user_ids(), vec!["u1".to_string()]);

        ledger.increase("u1", 3).unwrap();
        assert_eq!(ledger.like_count("u1"), Some(3));

        ledger.reset_all().unwrap();
        assert_eq!(ledger.like_count("u1"), Some(0));

        assert!(ledger.remove("u1").unwrap());
        assert!(!ledger.remove("u1").unwrap());
        assert!(ledger.is_empty());

        // add, increase, reset, remove each persisted exactly once
        assert_eq!(sink.saves.load(Ordering::SeqCst), 4);
        assert!(sink.last.lock().unwrap().is_empty());
    }

    #[test]
    fn test_has_reflects_net_effect() {
        let (ledger, _) = ledger();
        let ops = [
            ("a", true),
            ("b", true),
            ("a", false),
            ("c", true),
            ("a", true),
            ("b", false),
            ("b", false),
        ];
        for (id, add) in ops {
            if add {
                ledger.add(id).unwrap();
            } else {
                ledger.remove(id).unwrap();
            }
        }
        assert!(ledger.has("a"));
        assert!(!ledger.has("b"));
        assert!(ledger.has("c"));
        assert_eq!(ledger.all_user_ids(), vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_increase_absent_is_noop() {
        let (ledger, sink) = ledger();
        ledger.add("u1").unwrap();
        ledger.increase("u1", 2).unwrap();
        let saves = sink.saves.load(Ordering::SeqCst);

        ledger.increase("ghost", 5).unwrap();

        assert_eq!(ledger.len(), 1);
        assert!(!ledger.has("ghost"));
        assert_eq!(ledger.like_count("u1"), Some(2));
        assert_eq!(sink.saves.load(Ordering::SeqCst), saves);
    }

    #[test]
    fn test_reset_all_keeps_subscribers() {
        let (ledger, sink) = ledger();
        for (id, n) in [("a", 1), ("b", 10), ("c", 0)] {
            ledger.add(id).unwrap();
            ledger.increase(id, n).unwrap();
        }
        let before = sink.saves.load(Ordering::SeqCst);

        ledger.reset_all().unwrap();

        assert_eq!(sink.saves.load(Ordering::SeqCst), before + 1);
        assert_eq!(ledger.all_user_ids(), vec!["a", "b", "c"]);
        assert!(ledger.records().iter().all(|r| r.like_count == 0));
    }

    #[test]
    fn test_load_from_sink() {
        let sink = Arc::new(MemorySink::default());
        let ledger = SubscriptionLedger::load(sink.clone()).unwrap();
        assert!(ledger.is_empty());

        let store = Arc::new(ConfigStore::in_memory(likebot_config::PluginConfig {
            subscribe_data: vec![SubscriptionRecord {
                user_id: "42".into(),
                like_count: 7,
            }],
            ..Default::default()
        }));
        let ledger = SubscriptionLedger::load(store).unwrap();
        assert_eq!(ledger.like_count("42"), Some(7));
    }

    #[test]
    fn test_persist_failure_surfaces() {
        let ledger = SubscriptionLedger::new(Vec::new(), Arc::new(FailingSink));
        assert!(matches!(ledger.add("u1"), Err(StorageError::Persist(_))));
    }

    #[test]
    fn test_config_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        let store = Arc::new(ConfigStore::open(&path).unwrap());

        let ledger = SubscriptionLedger::from_config(store.clone());
        ledger.add("123456").unwrap();
        ledger.add("987654").unwrap();
        ledger.increase("123456", 10).unwrap();

        let reopened = Arc::new(ConfigStore::open(&path).unwrap());
        let ledger = SubscriptionLedger::from_config(reopened);
        assert_eq!(ledger.all_user_ids(), vec!["123456", "987654"]);
        assert_eq!(ledger.like_count("123456"), Some(10));
    }
}
