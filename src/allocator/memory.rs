use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use uuid::Uuid;

use super::store::{ClaimOutcome, KeyStore, StoreError};
use crate::models::{LicenseKey, ProductSummary};

/// In-memory store with failure injection, for tests only. The mutex stands in for the
/// database's write lock.
#[derive(Default)]
pub struct MemoryKeyStore {
    inner: Mutex<Inner>,
    mutations: AtomicUsize,
    calls: AtomicUsize,
    failures_left: AtomicU32,
}

#[derive(Default)]
struct Inner {
    keys: Vec<LicenseKey>,
    products: HashMap<String, ProductSummary>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, fsn: &str, summary: ProductSummary) {
        self.lock().products.insert(fsn.to_string(), summary);
    }

    pub fn add_keys<I, K>(&self, fsn: &str, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut inner = self.lock();
        for key in keys {
            inner.keys.push(LicenseKey {
                id: Uuid::new_v4().to_string(),
                license_key: key.into(),
                fsn: fsn.to_string(),
                is_redeemed: false,
                order_id: None,
                created_at: 0,
                redeemed_at: None,
                replaced_at: None,
            });
        }
    }

    /// Make the next `n` store calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of writes performed by successful claims.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of trait calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<LicenseKey> {
        self.lock().keys.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a key half-claimed
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Transient("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn has_pool(&self, fsn: &str) -> Result<bool, StoreError> {
        self.enter()?;
        let inner = self.lock();
        Ok(inner.products.contains_key(fsn) || inner.keys.iter().any(|k| k.fsn == fsn))
    }

    fn claim(&self, fsn: &str, order_id: &str, now: i64) -> Result<ClaimOutcome, StoreError> {
        self.enter()?;
        let mut inner = self.lock();
        if let Some(existing) = inner
            .keys
            .iter()
            .find(|k| k.fsn == fsn && k.is_live_for(order_id))
        {
            return Ok(ClaimOutcome::Existing(existing.clone()));
        }
        let Some(key) = inner.keys.iter_mut().find(|k| k.fsn == fsn && !k.is_redeemed) else {
            return Ok(ClaimOutcome::Exhausted);
        };
        key.is_redeemed = true;
        key.order_id = Some(order_id.to_string());
        key.redeemed_at = Some(now);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(ClaimOutcome::Claimed(key.clone()))
    }

    fn find_by_order(&self, order_id: &str) -> Result<Option<LicenseKey>, StoreError> {
        self.enter()?;
        Ok(self
            .lock()
            .keys
            .iter()
            .find(|k| k.is_live_for(order_id))
            .cloned())
    }

    fn product_info(&self, fsn: &str) -> Result<Option<ProductSummary>, StoreError> {
        self.enter()?;
        Ok(self.lock().products.get(fsn).cloned())
    }
}
