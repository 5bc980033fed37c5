use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{
    Appeal, AppealDecision, AppealFilter, AppealStats, AppealStatus, AuditAction, InitiateAppeal,
    Order, OrderId, ReviewAppeal,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::normalize_indian_phone;

#[derive(Debug, Serialize)]
pub struct AppealLookup {
    pub order: Order,
    pub appeals: Vec<Appeal>,
}

fn lenient_order_id(raw: &str) -> Result<OrderId> {
    OrderId::normalize(raw).ok_or_else(|| {
        AppError::BadRequest(
            "Invalid order ID: use NNN-NNNNNNN-NNNNNNN or the 17 digits without dashes".into(),
        )
    })
}

pub async fn list_appeals(
    State(state): State<AppState>,
    Query(filter): Query<AppealFilter>,
) -> Result<Json<Paginated<Appeal>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_appeals(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

pub async fn appeal_stats(State(state): State<AppState>) -> Result<Json<AppealStats>> {
    let conn = state.db.get()?;
    Ok(Json(queries::appeal_stats(&conn)?))
}

pub async fn lookup_order_appeals(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<AppealLookup>> {
    let order_id = lenient_order_id(&order_id)?;
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, order_id.as_str())?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    let appeals = queries::list_appeals_for_order(&conn, &order.order_id)?;
    Ok(Json(AppealLookup { order, appeals }))
}

/// Open an appeal on the customer's behalf. The order's warranty stays
/// blocked until the appeal is approved.
pub async fn initiate_appeal(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(mut input): Json<InitiateAppeal>,
) -> Result<(StatusCode, Json<Appeal>)> {
    let order_id = lenient_order_id(&input.order_id)?;
    if let Some(raw) = input.customer_phone.take().filter(|p| !p.trim().is_empty()) {
        input.customer_phone = Some(normalize_indian_phone(&raw).ok_or_else(|| {
            AppError::BadRequest("Phone must be a 10-digit Indian mobile (+91)".into())
        })?);
    }

    let mut conn = state.db.get()?;
    if queries::get_order(&conn, order_id.as_str())?.is_none() {
        return Err(AppError::NotFound("Order not found".into()));
    }

    let tx = conn.transaction()?;
    queries::set_warranty_blocked(&tx, order_id.as_str(), true)?;
    let appeal = queries::upsert_admin_appeal(&tx, order_id.as_str(), &input)?;
    tx.commit()?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::InitiateAppeal)
        .resource("appeal", &appeal.id)
        .details(&serde_json::json!({
            "order_id": appeal.order_id,
            "kind": appeal.kind,
        }))
        .save();

    tracing::info!(order_id = %order_id, kind = appeal.kind.as_ref(), "Appeal initiated by admin");
    Ok((StatusCode::CREATED, Json(appeal)))
}

pub async fn review_appeal(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ReviewAppeal>,
) -> Result<Json<Appeal>> {
    let notes = input
        .admin_notes
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut conn = state.db.get()?;
    let current = queries::get_appeal(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Appeal not found".into()))?;
    let next = current
        .status
        .decide(input.action)
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    let tx = conn.transaction()?;
    let clear_proof = input.action == AppealDecision::Resubmit;
    if !queries::update_appeal_status(&tx, &id, AppealStatus::Pending, next, notes, clear_proof)? {
        return Err(AppError::Conflict(
            "Appeal was updated by someone else, please reload".into(),
        ));
    }
    if next == AppealStatus::Approved {
        queries::set_warranty_blocked(&tx, &current.order_id, false)?;
    }
    tx.commit()?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::ReviewAppeal)
        .resource("appeal", &id)
        .details(&serde_json::json!({
            "order_id": current.order_id,
            "to": next,
        }))
        .save();

    queries::get_appeal(&conn, &id)?
        .map(Json)
        .ok_or_else(|| AppError::Internal("Appeal vanished after review".into()))
}
