use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{OrderId, ReplacementRequest, ReplacementStatus, SubmitReplacement};
use crate::util::is_valid_email;

#[derive(Debug, Serialize)]
pub struct ReplacementSummary {
    pub id: String,
    pub status: ReplacementStatus,
    /// Only shown for rejected requests
    pub admin_notes: Option<String>,
    pub created_at: i64,
    pub reviewed_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReplacementStatusResponse {
    pub order_id: String,
    /// Newest first
    pub requests: Vec<ReplacementSummary>,
    /// Key issued by the latest request, once approved
    pub new_license_key: Option<String>,
}

/// Report that the order's key does not activate.
pub async fn submit_replacement(
    State(state): State<AppState>,
    Json(input): Json<SubmitReplacement>,
) -> Result<(StatusCode, Json<ReplacementRequest>)> {
    let order_id =
        OrderId::parse(&input.order_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let email = input.customer_email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    let proof = input.proof.trim();
    if proof.is_empty() {
        return Err(AppError::BadRequest("Screenshot of the activation error is required".into()));
    }

    let conn = state.db.get()?;
    if queries::get_order(&conn, order_id.as_str())?.is_none() {
        return Err(AppError::NotFound("Order not found".into()));
    }
    let current = queries::get_key_by_order(&conn, order_id.as_str())?.ok_or_else(|| {
        AppError::BadRequest(
            "This order has not been activated yet. Activate it first, then request a replacement if needed".into(),
        )
    })?;

    let request = queries::create_replacement(&conn, &current, order_id.as_str(), &email, proof)?;
    tracing::info!(order_id = %order_id, request_id = %request.id, "Replacement requested");
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_replacement_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ReplacementStatusResponse>> {
    let order_id = OrderId::normalize(&order_id).ok_or_else(|| {
        AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into())
    })?;
    let conn = state.db.get()?;
    let requests = queries::list_replacements_for_order(&conn, order_id.as_str())?;

    let new_license_key = match requests.first() {
        Some(ReplacementRequest {
            status: ReplacementStatus::Approved,
            new_key_id: Some(key_id),
            ..
        }) => queries::get_license_key(&conn, key_id)?.map(|k| k.license_key),
        _ => None,
    };

    Ok(Json(ReplacementStatusResponse {
        order_id: order_id.to_string(),
        requests: requests
            .into_iter()
            .map(|r| ReplacementSummary {
                admin_notes: (r.status == ReplacementStatus::Rejected)
                    .then_some(r.admin_notes)
                    .flatten(),
                id: r.id,
                status: r.status,
                created_at: r.created_at,
                reviewed_at: r.reviewed_at,
            })
            .collect(),
        new_license_key,
    }))
}
