pub mod admin;
pub mod public;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::allocator::{KeyAllocator, SqliteKeyStore};
use crate::db::AppState;
use crate::error::{AppError, Result};

/// The full application: public buyer routes plus the admin API.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(public::router().layer(CorsLayer::permissive()))
        .merge(admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn allocator(state: &AppState) -> KeyAllocator<SqliteKeyStore> {
    KeyAllocator::new(SqliteKeyStore::new(state.db.clone())).with_retry(state.redeem_retry)
}

/// Run allocator work off the async runtime; its retry backoff sleeps the thread.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}
