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
    AuditAction, LicenseKey, NotificationKind, NotificationStatus, ReplacementDecision,
    ReplacementFilter, ReplacementRequest, ReplacementStats, ReplacementStatus, ReviewReplacement,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::absolute_url;

/// How many candidate keys the detail view offers.
const AVAILABLE_KEY_CHOICES: i64 = 50;

#[derive(Debug, Serialize)]
pub struct ReplacementDetail {
    #[serde(flatten)]
    pub request: ReplacementRequest,
    pub original_license_key: Option<String>,
    pub new_license_key: Option<String>,
    /// Keys the request could be approved with; empty once decided
    pub available_keys: Vec<LicenseKey>,
}

#[derive(Debug, Serialize)]
pub struct ReplacementReviewResponse {
    pub request: ReplacementRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<NotificationStatus>,
}

pub async fn list_replacements(
    State(state): State<AppState>,
    Query(filter): Query<ReplacementFilter>,
) -> Result<Json<Paginated<ReplacementRequest>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_replacements(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

pub async fn replacement_stats(State(state): State<AppState>) -> Result<Json<ReplacementStats>> {
    let conn = state.db.get()?;
    Ok(Json(queries::replacement_stats(&conn)?))
}

pub async fn get_replacement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplacementDetail>> {
    let conn = state.db.get()?;
    let request = queries::get_replacement(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Replacement request not found".into()))?;
    let original_license_key =
        queries::get_license_key(&conn, &request.original_key_id)?.map(|k| k.license_key);
    let new_license_key = match request.new_key_id.as_deref() {
        Some(key_id) => queries::get_license_key(&conn, key_id)?.map(|k| k.license_key),
        None => None,
    };
    let available_keys = if request.status == ReplacementStatus::Pending {
        queries::list_available_keys(&conn, &request.fsn, AVAILABLE_KEY_CHOICES)?
    } else {
        Vec::new()
    };
    Ok(Json(ReplacementDetail {
        request,
        original_license_key,
        new_license_key,
        available_keys,
    }))
}

/// Approve (issuing a new key) or reject a pending request, then email the
/// customer.
pub async fn review_replacement(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ReviewReplacement>,
) -> Result<Json<ReplacementReviewResponse>> {
    let notes = input
        .admin_notes
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut conn = state.db.get()?;
    let (request, new_key) = match input.action {
        ReplacementDecision::Approve => {
            let (request, key) = queries::approve_replacement(
                &mut conn,
                &id,
                input.license_key_id.as_deref(),
                notes,
                &ctx.admin.id,
            )?;
            (request, Some(key))
        }
        ReplacementDecision::Reject => {
            let reason = notes.ok_or_else(|| {
                AppError::BadRequest("admin_notes are required when rejecting".into())
            })?;
            let current = queries::get_replacement(&conn, &id)?
                .ok_or_else(|| AppError::NotFound("Replacement request not found".into()))?;
            current
                .status
                .decide(ReplacementDecision::Reject)
                .map_err(|e| AppError::Conflict(e.to_string()))?;
            if !queries::reject_replacement(&conn, &id, reason, &ctx.admin.id)? {
                return Err(AppError::Conflict(
                    "Replacement request was updated by someone else, please reload".into(),
                ));
            }
            let request = queries::get_replacement(&conn, &id)?.ok_or_else(|| {
                AppError::Internal("Replacement request vanished after review".into())
            })?;
            (request, None)
        }
    };

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::ReviewReplacement)
        .resource("replacement_request", &id)
        .details(&serde_json::json!({
            "order_id": request.order_id,
            "to": request.status,
            "original_key_id": request.original_key_id,
            "new_key_id": request.new_key_id,
        }))
        .save();
    drop(conn);

    tracing::info!(
        request_id = %id,
        order_id = %request.order_id,
        status = request.status.as_ref(),
        "Replacement request reviewed"
    );

    let (kind, message) = match &new_key {
        Some(key) => (
            NotificationKind::ReplacementApproved,
            email::replacement_approved(
                &request.order_id,
                &key.license_key,
                &absolute_url(&state.base_url, "/activate"),
            ),
        ),
        None => (
            NotificationKind::ReplacementRejected,
            email::replacement_rejected(
                &request.order_id,
                request.admin_notes.as_deref().unwrap_or_default(),
            ),
        ),
    };
    let email_status = state
        .notifier
        .deliver(kind, &request.customer_email, &message, Some(&request.order_id))
        .await
        .map(|n| n.status);

    Ok(Json(ReplacementReviewResponse {
        request,
        new_license_key: new_key.map(|k| k.license_key),
        email_status,
    }))
}
