use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::allocator::{RedeemRequest, Redemption};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::handlers::{allocator, blocking};
use crate::ingest::{self, IngestReport};
use crate::middleware::AdminContext;
use crate::models::{AuditAction, KeyStockStats, LicenseKey, LicenseKeyFilter, OrderId};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ImportKeysRequest {
    /// Newline-separated keys
    pub keys: String,
}

#[derive(Debug, Deserialize)]
pub struct PurgeKeysRequest {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub fsn: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgeKeysResponse {
    pub deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct ManualRedeemRequest {
    pub fsn: String,
    pub order_id: String,
}

pub async fn import_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(fsn): Path<String>,
    Json(input): Json<ImportKeysRequest>,
) -> Result<Json<IngestReport>> {
    let mut conn = state.db.get()?;
    let report = ingest::import_keys(&mut conn, &fsn, &input.keys)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::ImportKeys)
        .resource("product", &fsn)
        .details(&serde_json::json!({
            "submitted": report.submitted,
            "inserted": report.inserted,
            "failed": report.failed,
        }))
        .save();

    tracing::info!(
        fsn = %fsn,
        inserted = report.inserted,
        failed = report.failed,
        "License keys imported"
    );
    Ok(Json(report))
}

pub async fn list_keys(
    State(state): State<AppState>,
    Query(filter): Query<LicenseKeyFilter>,
) -> Result<Json<Paginated<LicenseKey>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (keys, total) = queries::list_license_keys(&conn, &filter)?;
    Ok(Json(Paginated::new(keys, total, page.limit(), page.offset())))
}

pub async fn key_stats(State(state): State<AppState>) -> Result<Json<Vec<KeyStockStats>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::key_stock_stats(&conn)?))
}

/// Delete unused keys by id or for a whole FSN. Redeemed keys are skipped.
pub async fn purge_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<PurgeKeysRequest>,
) -> Result<Json<PurgeKeysResponse>> {
    let mut conn = state.db.get()?;
    let (deleted, details) = match (&input.ids, &input.fsn) {
        (Some(ids), None) if !ids.is_empty() => (
            queries::purge_unused_keys_by_ids(&mut conn, ids)?,
            serde_json::json!({ "ids": ids }),
        ),
        (None, Some(fsn)) if !fsn.trim().is_empty() => (
            queries::purge_unused_keys_by_fsn(&conn, fsn.trim())?,
            serde_json::json!({ "fsn": fsn.trim() }),
        ),
        _ => {
            return Err(AppError::BadRequest(
                "Provide either a non-empty ids list or an fsn".into(),
            ));
        }
    };

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::PurgeKeys)
        .resource("license_key", input.fsn.as_deref().unwrap_or("*"))
        .details(&serde_json::json!({ "deleted": deleted, "target": details }))
        .save();

    tracing::info!(deleted, "Unused license keys purged");
    Ok(Json(PurgeKeysResponse { deleted }))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<LicenseKey>> {
    let conn = state.db.get()?;
    let key = queries::get_license_key(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("License key not found".into()))?;
    if key.is_redeemed || !queries::delete_unused_key(&conn, &id)? {
        return Err(AppError::Conflict("Redeemed keys cannot be deleted".into()));
    }

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::DeleteKey)
        .resource("license_key", &id)
        .details(&serde_json::json!({ "fsn": key.fsn }))
        .save();

    Ok(Json(key))
}

/// Redeem on a buyer's behalf, e.g. from a support conversation.
pub async fn redeem_for_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<ManualRedeemRequest>,
) -> Result<Json<Redemption>> {
    let order_id = OrderId::normalize(&input.order_id)
        .ok_or_else(|| AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into()))?;

    let alloc = allocator(&state);
    let request = RedeemRequest::new(input.fsn, order_id.to_string());
    let redemption = blocking(move || alloc.redeem_key(&request).map_err(AppError::from)).await?;

    if redemption.newly_redeemed {
        let conn = state.db.get()?;
        ctx.audit(&conn, &state, &headers)
            .action(AuditAction::RedeemKey)
            .resource("license_key", &redemption.key_id)
            .details(&serde_json::json!({
                "fsn": redemption.fsn,
                "order_id": redemption.order_id,
            }))
            .save();
    }
    Ok(Json(redemption))
}

pub async fn lookup_key_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Redemption>> {
    let order_id = OrderId::normalize(&order_id)
        .ok_or_else(|| AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into()))?;
    let alloc = allocator(&state);
    blocking(move || alloc.lookup_redemption(order_id.as_str()).map_err(AppError::from))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No key has been redeemed for this order".into()))
}
