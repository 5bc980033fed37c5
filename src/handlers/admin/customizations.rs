use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::handlers::public::mailbox;
use crate::middleware::AdminContext;
use crate::models::{
    AuditAction, CompleteCustomization, Customization, CustomizationFilter, CustomizationStatus,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::is_valid_email;

pub async fn list_customizations(
    State(state): State<AppState>,
    Query(filter): Query<CustomizationFilter>,
) -> Result<Json<Paginated<Customization>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_customizations(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

/// Mark a username request done once the mailbox exists.
pub async fn complete_customization(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CompleteCustomization>,
) -> Result<Json<Customization>> {
    let conn = state.db.get()?;
    let current = queries::get_customization(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Customization request not found".into()))?;
    if current.status == CustomizationStatus::Completed {
        return Err(AppError::Conflict("Customization is already completed".into()));
    }

    let generated_email = match input.generated_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => {
            if !is_valid_email(email) {
                return Err(AppError::BadRequest("Invalid email address".into()));
            }
            email.to_lowercase()
        }
        _ => mailbox(&current.username, &state.customization_domain),
    };

    if !queries::complete_customization(&conn, &id, &generated_email)? {
        return Err(AppError::Conflict("Customization is already completed".into()));
    }

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::CompleteCustomization)
        .resource("customization", &id)
        .details(&serde_json::json!({
            "order_id": current.order_id,
            "generated_email": generated_email,
        }))
        .save();

    queries::get_customization(&conn, &id)?
        .map(Json)
        .ok_or_else(|| AppError::Internal("Customization vanished after update".into()))
}
