use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, is_unique_violation};
use crate::extractors::{Json, Path};
use crate::models::{OrderId, ResubmitWarranty, SubmitWarranty, WarrantyRegistration};
use crate::util::is_valid_email;

#[derive(Debug, Serialize)]
pub struct WarrantySubmitResponse {
    /// False when a registration already existed and was returned unchanged
    pub created: bool,
    pub registration: WarrantyRegistration,
}

fn parse_order_id(raw: &str) -> Result<OrderId> {
    OrderId::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn require_proof(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} screenshot is required", what)));
    }
    Ok(())
}

pub async fn submit_warranty(
    State(state): State<AppState>,
    Json(input): Json<SubmitWarranty>,
) -> Result<(StatusCode, Json<WarrantySubmitResponse>)> {
    let order_id = parse_order_id(&input.order_id)?;
    require_proof(&input.seller_feedback_proof, "Seller feedback")?;
    require_proof(&input.product_review_proof, "Product review")?;
    if input.customer_email.as_deref().is_some_and(|e| !is_valid_email(e)) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }

    let conn = state.db.get()?;
    let order = queries::get_order(&conn, order_id.as_str())?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    if order.warranty_blocked {
        return Err(AppError::Forbidden(
            "Warranty is on hold for this order while a feedback or review appeal is open".into(),
        ));
    }

    if let Some(existing) = queries::get_warranty_by_order(&conn, order_id.as_str())? {
        return Ok((
            StatusCode::OK,
            Json(WarrantySubmitResponse {
                created: false,
                registration: existing,
            }),
        ));
    }

    match queries::create_warranty(&conn, order_id.as_str(), &input) {
        Ok(registration) => {
            tracing::info!(order_id = %order_id, "Warranty registration submitted");
            Ok((
                StatusCode::CREATED,
                Json(WarrantySubmitResponse {
                    created: true,
                    registration,
                }),
            ))
        }
        // Lost a race with a concurrent submission for the same order
        Err(AppError::Database(e)) if is_unique_violation(&e) => {
            let existing = queries::get_warranty_by_order(&conn, order_id.as_str())?
                .ok_or_else(|| AppError::Internal("Warranty vanished after conflict".into()))?;
            Ok((
                StatusCode::OK,
                Json(WarrantySubmitResponse {
                    created: false,
                    registration: existing,
                }),
            ))
        }
        Err(e) => Err(e),
    }
}

pub async fn get_warranty_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<WarrantyRegistration>> {
    let order_id = parse_order_id(&order_id)?;
    let conn = state.db.get()?;
    queries::get_warranty_by_order(&conn, order_id.as_str())?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No warranty registration for this order".into()))
}

/// Upload the proofs an admin flagged as missing.
pub async fn resubmit_warranty(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(input): Json<ResubmitWarranty>,
) -> Result<Json<WarrantyRegistration>> {
    let order_id = parse_order_id(&order_id)?;
    let conn = state.db.get()?;
    let registration = queries::get_warranty_by_order(&conn, order_id.as_str())?
        .ok_or_else(|| AppError::NotFound("No warranty registration for this order".into()))?;

    registration
        .status
        .resubmit()
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    let seller = input
        .seller_feedback_proof
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let review = input
        .product_review_proof
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if registration.missing_seller_feedback && seller.is_none() {
        return Err(AppError::BadRequest("Seller feedback screenshot is required".into()));
    }
    if registration.missing_product_review && review.is_none() {
        return Err(AppError::BadRequest("Product review screenshot is required".into()));
    }
    if seller.is_none() && review.is_none() {
        return Err(AppError::BadRequest("Upload at least one screenshot".into()));
    }

    if !queries::resubmit_warranty(&conn, &registration.id, seller, review)? {
        return Err(AppError::Conflict(
            "Warranty registration changed, please reload".into(),
        ));
    }
    tracing::info!(order_id = %order_id, "Warranty proof resubmitted");

    queries::get_warranty(&conn, &registration.id)?
        .map(Json)
        .ok_or_else(|| AppError::Internal("Warranty vanished after resubmission".into()))
}
