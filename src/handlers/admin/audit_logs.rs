use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{AuditLog, AuditLogQuery};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn query_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLog>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(query.limit, query.offset);
    let (logs, total) = queries::query_audit_logs(&conn, &query)?;
    Ok(Json(Paginated::new(logs, total, page.limit(), page.offset())))
}
