use rusqlite::TransactionBehavior;
use thiserror::Error;

use crate::db::{DbPool, queries};
use crate::error::{AppError, is_unique_violation};
use crate::models::{LicenseKey, ProductSummary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Busy database, pool timeout or similar. Worth another attempt.
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

impl From<AppError> for StoreError {
    fn from(err: AppError) -> Self {
        if err.is_transient() {
            StoreError::Transient(err.to_string())
        } else {
            StoreError::Fatal(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::from(err).into()
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        AppError::from(err).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The order already held a key from this pool; nothing was written.
    Existing(LicenseKey),
    /// An available key was marked redeemed for the order.
    Claimed(LicenseKey),
    /// No available keys remain; nothing was written.
    Exhausted,
}

/// Storage the allocator runs against.
///
/// `claim` must be atomic: the existing-key check and the conditional
/// select-and-mark happen as one unit, so two concurrent claims can never
/// receive the same key and one order never receives two keys from a pool.
pub trait KeyStore: Send + Sync {
    /// True if `fsn` names a catalog product or has any keys loaded.
    fn has_pool(&self, fsn: &str) -> Result<bool, StoreError>;

    fn claim(&self, fsn: &str, order_id: &str, now: i64) -> Result<ClaimOutcome, StoreError>;

    fn find_by_order(&self, order_id: &str) -> Result<Option<LicenseKey>, StoreError>;

    fn product_info(&self, fsn: &str) -> Result<Option<ProductSummary>, StoreError>;
}

impl<T: KeyStore + ?Sized> KeyStore for &T {
    fn has_pool(&self, fsn: &str) -> Result<bool, StoreError> {
        (**self).has_pool(fsn)
    }

    fn claim(&self, fsn: &str, order_id: &str, now: i64) -> Result<ClaimOutcome, StoreError> {
        (**self).claim(fsn, order_id, now)
    }

    fn find_by_order(&self, order_id: &str) -> Result<Option<LicenseKey>, StoreError> {
        (**self).find_by_order(order_id)
    }

    fn product_info(&self, fsn: &str) -> Result<Option<ProductSummary>, StoreError> {
        (**self).product_info(fsn)
    }
}

/// SQLite-backed store. Claims run inside an IMMEDIATE transaction so the
/// write lock is taken before the existing-key check.
#[derive(Clone)]
pub struct SqliteKeyStore {
    pool: DbPool,
}

impl SqliteKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl KeyStore for SqliteKeyStore {
    fn has_pool(&self, fsn: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        if queries::get_product(&conn, fsn)?.is_some() {
            return Ok(true);
        }
        Ok(queries::count_keys_for_fsn(&conn, fsn)? > 0)
    }

    fn claim(&self, fsn: &str, order_id: &str, now: i64) -> Result<ClaimOutcome, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = queries::get_key_by_fsn_and_order(&tx, fsn, order_id)? {
            return Ok(ClaimOutcome::Existing(existing));
        }

        match queries::claim_available_key(&tx, fsn, order_id, now) {
            Ok(Some(key)) => {
                tx.commit()?;
                Ok(ClaimOutcome::Claimed(key))
            }
            Ok(None) => Ok(ClaimOutcome::Exhausted),
            // Another writer bound this order first; the retry will find its key
            Err(AppError::Database(e)) if is_unique_violation(&e) => {
                Err(StoreError::Transient(format!("concurrent claim for {}", order_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_order(&self, order_id: &str) -> Result<Option<LicenseKey>, StoreError> {
        let conn = self.pool.get()?;
        Ok(queries::get_key_by_order(&conn, order_id)?)
    }

    fn product_info(&self, fsn: &str) -> Result<Option<ProductSummary>, StoreError> {
        let conn = self.pool.get()?;
        Ok(queries::get_product(&conn, fsn)?.map(|p| p.summary()))
    }
}
