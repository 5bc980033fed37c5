use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::email;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{
    AuditAction, NotificationKind, NotificationStatus, Order, ReviewWarranty, WarrantyDecision,
    WarrantyFilter, WarrantyRegistration,
};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Serialize)]
pub struct WarrantyDetail {
    #[serde(flatten)]
    pub registration: WarrantyRegistration,
    pub order: Option<Order>,
}

#[derive(Debug, Serialize)]
pub struct WarrantyReviewResponse {
    pub registration: WarrantyRegistration,
    /// Outcome of the customer email, when an address was known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<NotificationStatus>,
}

pub async fn list_warranties(
    State(state): State<AppState>,
    Query(filter): Query<WarrantyFilter>,
) -> Result<Json<Paginated<WarrantyRegistration>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_warranties(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

pub async fn get_warranty(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WarrantyDetail>> {
    let conn = state.db.get()?;
    let registration = queries::get_warranty(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Warranty registration not found".into()))?;
    let order = queries::get_order(&conn, &registration.order_id)?;
    Ok(Json(WarrantyDetail { registration, order }))
}

/// Approve, reject or send back a registration, then tell the customer.
pub async fn review_warranty(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ReviewWarranty>,
) -> Result<Json<WarrantyReviewResponse>> {
    let notes = input
        .admin_notes
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (registration, recipient) = {
        let conn = state.db.get()?;
        let current = queries::get_warranty(&conn, &id)?
            .ok_or_else(|| AppError::NotFound("Warranty registration not found".into()))?;
        let next = current
            .status
            .decide(input.decision)
            .map_err(|e| AppError::Conflict(e.to_string()))?;

        if !queries::apply_warranty_decision(&conn, &id, current.status, input.decision, next, notes)? {
            return Err(AppError::Conflict(
                "Warranty registration was updated by someone else, please reload".into(),
            ));
        }

        ctx.audit(&conn, &state, &headers)
            .action(AuditAction::ReviewWarranty)
            .resource("warranty", &id)
            .details(&serde_json::json!({
                "order_id": current.order_id,
                "from": current.status,
                "to": next,
            }))
            .save();

        let registration = queries::get_warranty(&conn, &id)?
            .ok_or_else(|| AppError::Internal("Warranty vanished after review".into()))?;
        let recipient = match registration.notify_email() {
            Some(email) => Some(email.to_string()),
            None => queries::get_order(&conn, &registration.order_id)?
                .and_then(|o| o.contact_email),
        };
        (registration, recipient)
    };

    tracing::info!(
        warranty_id = %id,
        order_id = %registration.order_id,
        status = registration.status.as_ref(),
        "Warranty reviewed"
    );

    let email_status = match recipient {
        Some(to) => {
            let order_id = registration.order_id.as_str();
            let (kind, message) = match input.decision {
                WarrantyDecision::Approve => (
                    NotificationKind::WarrantyApproved,
                    email::warranty_approved(order_id),
                ),
                WarrantyDecision::Reject => (
                    NotificationKind::WarrantyRejected,
                    email::warranty_rejected(order_id, registration.rejection_reason.as_deref()),
                ),
                WarrantyDecision::RequestResubmission {
                    missing_seller_feedback,
                    missing_product_review,
                } => (
                    NotificationKind::WarrantyResubmission,
                    email::warranty_resubmission(
                        order_id,
                        missing_seller_feedback,
                        missing_product_review,
                        notes,
                    ),
                ),
            };
            state
                .notifier
                .deliver(kind, &to, &message, Some(order_id))
                .await
                .map(|n| n.status)
        }
        None => None,
    };

    Ok(Json(WarrantyReviewResponse {
        registration,
        email_status,
    }))
}
