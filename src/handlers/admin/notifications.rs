use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{AuditAction, Notification, NotificationFilter};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<Paginated<Notification>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_notifications(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

/// Re-send a failed or skipped email using the stored message.
pub async fn retry_notification(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Notification>> {
    let notification = state.notifier.retry(&id).await?;

    let conn = state.db.get()?;
    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::RetryNotification)
        .resource("notification", &id)
        .details(&serde_json::json!({
            "status": notification.status,
            "attempts": notification.attempts,
        }))
        .save();

    Ok(Json(notification))
}
