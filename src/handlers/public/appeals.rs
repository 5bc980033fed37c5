use axum::{extract::State, http::StatusCode};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{Appeal, AppealStatus, OrderId, SubmitAppeal};
use crate::util::normalize_indian_phone;

/// Submit proof that negative feedback or a review was removed. A rejected
/// or resubmit appeal is reopened; a pending or approved one is left alone.
pub async fn submit_appeal(
    State(state): State<AppState>,
    Json(mut input): Json<SubmitAppeal>,
) -> Result<(StatusCode, Json<Appeal>)> {
    let order_id =
        OrderId::parse(&input.order_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if input.proof.trim().is_empty() {
        return Err(AppError::BadRequest("Proof screenshot is required".into()));
    }
    let refund_amount = input.refund_amount().map_err(|e| AppError::BadRequest(e.into()))?;
    if let Some(raw) = input.customer_phone.take().filter(|p| !p.trim().is_empty()) {
        input.customer_phone = Some(normalize_indian_phone(&raw).ok_or_else(|| {
            AppError::BadRequest("Phone must be a 10-digit Indian mobile (+91)".into())
        })?);
    }

    let conn = state.db.get()?;
    if queries::get_order(&conn, order_id.as_str())?.is_none() {
        return Err(AppError::NotFound("Order not found".into()));
    }

    let existing = queries::get_appeal_by_order(&conn, order_id.as_str(), input.kind)?;
    let is_new = existing.is_none();
    AppealStatus::submit(existing.map(|a| a.status))
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    let appeal = queries::upsert_customer_appeal(&conn, order_id.as_str(), &input, refund_amount)?
        .ok_or_else(|| AppError::Conflict("An appeal for this order is already under review".into()))?;

    tracing::info!(
        order_id = %order_id,
        kind = input.kind.as_ref(),
        "Appeal submitted"
    );
    let status = if is_new { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(appeal)))
}

pub async fn list_order_appeals(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<Appeal>>> {
    let order_id = OrderId::normalize(&order_id)
        .ok_or_else(|| AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into()))?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_appeals_for_order(&conn, order_id.as_str())?))
}
