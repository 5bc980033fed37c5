use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{Admin, AdminRole, AuditAction, CreateAdmin, CreatedAdmin};
use crate::util::is_valid_email;

/// Create an admin. The API key is in the response and never again.
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(mut input): Json<CreateAdmin>,
) -> Result<(StatusCode, Json<CreatedAdmin>)> {
    input.email = input.email.trim().to_lowercase();
    if !is_valid_email(&input.email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let conn = state.db.get()?;
    let (admin, api_key) = queries::create_admin(&conn, &input, Some(&ctx.admin.id))?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::CreateAdmin)
        .resource("admin", &admin.id)
        .details(&serde_json::json!({ "email": admin.email, "role": admin.role }))
        .save();

    Ok((StatusCode::CREATED, Json(CreatedAdmin { admin, api_key })))
}

pub async fn list_admins(State(state): State<AppState>) -> Result<Json<Vec<Admin>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_admins(&conn)?))
}

pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if id == ctx.admin.id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let conn = state.db.get()?;
    let target = queries::get_admin(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Admin not found".into()))?;
    if target.role == AdminRole::Owner && queries::count_owners(&conn)? <= 1 {
        return Err(AppError::Conflict("Cannot delete the last owner".into()));
    }
    queries::delete_admin(&conn, &id)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::DeleteAdmin)
        .resource("admin", &id)
        .details(&serde_json::json!({ "email": target.email }))
        .save();

    Ok(StatusCode::NO_CONTENT)
}
