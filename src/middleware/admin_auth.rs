use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::{ActorType, Admin, AdminRole};
use crate::util::{AuditLogBuilder, extract_bearer_token};

#[derive(Clone)]
pub struct AdminContext {
    pub admin: Admin,
}

impl AdminContext {
    /// Audit builder pre-filled with this admin as the actor.
    pub fn audit<'a>(
        &self,
        conn: &'a rusqlite::Connection,
        state: &AppState,
        headers: &HeaderMap,
    ) -> AuditLogBuilder<'a> {
        AuditLogBuilder::new(conn, state.audit_log_enabled, headers)
            .actor(ActorType::Admin, Some(&self.admin.id))
            .actor_email(Some(&self.admin.email))
    }
}

fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<Admin, AppError> {
    let api_key = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let conn = state.db.get()?;
    queries::get_admin_by_api_key(&conn, api_key)?.ok_or(AppError::Unauthorized)
}

/// Any admin role.
pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let admin = authenticate_admin(&state, request.headers())?;
    request.extensions_mut().insert(AdminContext { admin });
    Ok(next.run(request).await)
}

/// Owner only: admin management and destructive key operations.
pub async fn require_owner_role(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let admin = authenticate_admin(&state, request.headers())?;
    if admin.role != AdminRole::Owner {
        return Err(AppError::Forbidden("Owner role required".into()));
    }
    request.extensions_mut().insert(AdminContext { admin });
    Ok(next.run(request).await)
}
