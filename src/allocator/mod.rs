//! License key allocation.
//!
//! `KeyAllocator` hands out at most one key per (product, order) pair. The
//! storage layer's atomic claim is the only serialization point; the allocator
//! itself holds no locks and can be shared freely across request handlers.

#[cfg(any(test, feature = "test-support"))]
mod memory;
mod store;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryKeyStore;
pub use store::{ClaimOutcome, KeyStore, SqliteKeyStore, StoreError};

use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::{InvalidOrderId, LicenseKey, OrderId, ProductSummary};

/// How often a redemption is re-run when storage reports a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    /// Product identifier (FSN) naming the key pool
    pub product_id: String,
    pub order_id: String,
}

impl RedeemRequest {
    pub fn new(product_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            order_id: order_id.into(),
        }
    }
}

/// A key bound to an order, with the metadata a buyer needs to install it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub key_id: String,
    pub license_key: String,
    pub fsn: String,
    pub order_id: String,
    pub redeemed_at: i64,
    /// False when the key had already been issued to this order
    pub newly_redeemed: bool,
    pub product: ProductSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// The pool is empty; callers route the buyer to support.
    Exhaustion,
    /// Storage stayed unavailable through every retry.
    Transient,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error(transparent)]
    InvalidOrderFormat(#[from] InvalidOrderId),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("No license keys available for {0}")]
    NoKeyAvailable(String),

    #[error("Storage unavailable after {attempts} attempts: {message}")]
    TransientExhausted { attempts: u32, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AllocError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocError::InvalidOrderFormat(_) | AllocError::UnknownProduct(_) => {
                ErrorKind::Validation
            }
            AllocError::NoKeyAvailable(_) => ErrorKind::Exhaustion,
            AllocError::TransientExhausted { .. } => ErrorKind::Transient,
            AllocError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<AllocError> for AppError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::InvalidOrderFormat(e) => AppError::BadRequest(e.to_string()),
            AllocError::UnknownProduct(_) => AppError::NotFound(err.to_string()),
            AllocError::NoKeyAvailable(_) => AppError::NoKeyAvailable(err.to_string()),
            AllocError::TransientExhausted { .. } => AppError::Unavailable(err.to_string()),
            AllocError::Storage(msg) => AppError::Internal(msg),
        }
    }
}

pub struct KeyAllocator<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KeyStore> KeyAllocator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bind a key of `product_id` to `order_id`, or return the key already
    /// bound to it.
    ///
    /// The order id is validated before storage is touched. Transient storage
    /// failures re-run the whole call, which is safe because a second run finds
    /// the key the first one claimed.
    pub fn redeem_key(&self, request: &RedeemRequest) -> Result<Redemption, AllocError> {
        let order_id = OrderId::parse(&request.order_id)?;
        let fsn = request.product_id.trim();
        if fsn.is_empty() {
            return Err(AllocError::UnknownProduct(request.product_id.clone()));
        }

        let redemption = self.with_retries("redeem_key", || self.try_redeem(fsn, &order_id))?;

        if redemption.newly_redeemed {
            tracing::info!(
                fsn = %redemption.fsn,
                order_id = %redemption.order_id,
                key_id = %redemption.key_id,
                "License key redeemed"
            );
        } else {
            tracing::debug!(
                fsn = %redemption.fsn,
                order_id = %redemption.order_id,
                "Returning previously redeemed key"
            );
        }
        Ok(redemption)
    }

    /// The key previously redeemed for `order_id`, if any.
    pub fn lookup_redemption(&self, order_id: &str) -> Result<Option<Redemption>, AllocError> {
        let order_id = OrderId::parse(order_id)?;
        self.with_retries("lookup_redemption", || {
            let Some(key) = self.store.find_by_order(order_id.as_str())? else {
                return Ok(None);
            };
            let product = self.product_summary(&key.fsn)?;
            Ok(Some(to_redemption(key, product, false)))
        })
    }

    fn try_redeem(&self, fsn: &str, order_id: &OrderId) -> Result<Redemption, AttemptError> {
        if !self.store.has_pool(fsn)? {
            return Err(AllocError::UnknownProduct(fsn.to_string()).into());
        }
        let (key, newly_redeemed) =
            match self.store.claim(fsn, order_id.as_str(), Utc::now().timestamp())? {
                ClaimOutcome::Existing(key) => (key, false),
                ClaimOutcome::Claimed(key) => (key, true),
                ClaimOutcome::Exhausted => {
                    tracing::warn!(fsn = %fsn, order_id = %order_id, "Key pool exhausted");
                    return Err(AllocError::NoKeyAvailable(fsn.to_string()).into());
                }
            };
        let product = self.product_summary(fsn)?;
        Ok(to_redemption(key, product, newly_redeemed))
    }

    fn product_summary(&self, fsn: &str) -> Result<ProductSummary, StoreError> {
        Ok(self
            .store
            .product_info(fsn)?
            .unwrap_or_else(|| ProductSummary::fallback(fsn)))
    }

    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Result<T, AttemptError>,
    ) -> Result<T, AllocError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.backoff;
        let mut tried = 0;
        loop {
            tried += 1;
            match attempt() {
                Ok(value) => return Ok(value),
                Err(AttemptError::Final(e)) => return Err(e),
                Err(AttemptError::Store(StoreError::Fatal(message))) => {
                    tracing::error!(operation, error = %message, "Key store failure");
                    return Err(AllocError::Storage(message));
                }
                Err(AttemptError::Store(StoreError::Transient(message))) => {
                    if tried >= max_attempts {
                        tracing::error!(
                            operation,
                            attempts = tried,
                            error = %message,
                            "Key store unavailable, giving up"
                        );
                        return Err(AllocError::TransientExhausted {
                            attempts: tried,
                            message,
                        });
                    }
                    tracing::warn!(
                        operation,
                        attempt = tried,
                        error = %message,
                        "Transient key store failure, retrying"
                    );
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }
    }
}

/// Outcome of one attempt: either a decided result or a store failure that
/// the retry loop classifies.
enum AttemptError {
    Final(AllocError),
    Store(StoreError),
}

impl From<AllocError> for AttemptError {
    fn from(e: AllocError) -> Self {
        AttemptError::Final(e)
    }
}

impl From<StoreError> for AttemptError {
    fn from(e: StoreError) -> Self {
        AttemptError::Store(e)
    }
}

fn to_redemption(key: LicenseKey, product: ProductSummary, newly_redeemed: bool) -> Redemption {
    Redemption {
        key_id: key.id,
        license_key: key.license_key,
        fsn: key.fsn,
        order_id: key.order_id.unwrap_or_default(),
        redeemed_at: key.redeemed_at.unwrap_or(key.created_at),
        newly_redeemed,
        product,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = "408-1234567-1234567";

    fn allocator(store: MemoryKeyStore) -> KeyAllocator<MemoryKeyStore> {
        KeyAllocator::new(store).with_retry(RetryPolicy::no_backoff(3))
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let store = MemoryKeyStore::new();
        store.add_keys("OFFICE2024WIN", ["AAAAA-11111"]);
        store.fail_next(2);
        let alloc = allocator(store);

        let redemption = alloc
            .redeem_key(&RedeemRequest::new("OFFICE2024WIN", ORDER))
            .unwrap();
        assert_eq!(redemption.license_key, "AAAAA-11111");
        assert!(redemption.newly_redeemed);
        assert_eq!(alloc.store().mutation_count(), 1);
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let store = MemoryKeyStore::new();
        store.add_keys("OFFICE2024WIN", ["AAAAA-11111"]);
        store.fail_next(10);
        let alloc = allocator(store);

        let err = alloc
            .redeem_key(&RedeemRequest::new("OFFICE2024WIN", ORDER))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, AllocError::TransientExhausted { attempts: 3, .. }));
        assert_eq!(alloc.store().mutation_count(), 0);
    }

    #[test]
    fn test_exhaustion_is_not_retried() {
        let store = MemoryKeyStore::new();
        store.add_product("OFFICE2024WIN", ProductSummary::fallback("OFFICE2024WIN"));
        let alloc = allocator(store);

        let err = alloc
            .redeem_key(&RedeemRequest::new("OFFICE2024WIN", ORDER))
            .unwrap_err();
        assert_eq!(err, AllocError::NoKeyAvailable("OFFICE2024WIN".into()));
        assert_eq!(err.kind(), ErrorKind::Exhaustion);
        assert_eq!(alloc.store().calls(), 2);
    }

    #[test]
    fn test_unknown_product() {
        let alloc = allocator(MemoryKeyStore::new());
        let err = alloc
            .redeem_key(&RedeemRequest::new("NOPE", ORDER))
            .unwrap_err();
        assert_eq!(err, AllocError::UnknownProduct("NOPE".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_mapping() {
        let app: AppError = AllocError::NoKeyAvailable("X".into()).into();
        assert_eq!(app.code(), "no_key_available");
        let app: AppError = AllocError::InvalidOrderFormat(InvalidOrderId).into();
        assert_eq!(app.code(), "bad_request");
        let app: AppError = AllocError::TransientExhausted {
            attempts: 3,
            message: "busy".into(),
        }
        .into();
        assert_eq!(app.code(), "unavailable");
    }

    #[test]
    fn test_lookup_redemption() {
        let store = MemoryKeyStore::new();
        store.add_keys("OFFICE2024WIN", ["AAAAA-11111"]);
        let alloc = allocator(store);

        assert_eq!(alloc.lookup_redemption(ORDER).unwrap(), None);
        alloc
            .redeem_key(&RedeemRequest::new("OFFICE2024WIN", ORDER))
            .unwrap();
        let found = alloc.lookup_redemption(ORDER).unwrap().unwrap();
        assert_eq!(found.license_key, "AAAAA-11111");
        assert!(!found.newly_redeemed);
        assert!(alloc.lookup_redemption("bad-id").is_err());
    }
}
