use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{AuditAction, CreateProduct, Product, UpdateProduct};

fn require_field(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", name)));
    }
    Ok(())
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(mut input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    input.fsn = input.fsn.trim().to_string();
    require_field(&input.fsn, "fsn")?;
    require_field(&input.title, "title")?;

    let conn = state.db.get()?;
    let product = queries::create_product(&conn, &input)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::CreateProduct)
        .resource("product", &product.fsn)
        .details(&serde_json::json!({ "title": product.title }))
        .save();

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_products(&conn)?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(fsn): Path<String>,
) -> Result<Json<Product>> {
    let conn = state.db.get()?;
    queries::get_product(&conn, &fsn)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".into()))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(fsn): Path<String>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    if let Some(title) = &input.title {
        require_field(title, "title")?;
    }

    let conn = state.db.get()?;
    if !queries::update_product(&conn, &fsn, &input)?
        && queries::get_product(&conn, &fsn)?.is_none()
    {
        return Err(AppError::NotFound("Product not found".into()));
    }

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::UpdateProduct)
        .resource("product", &fsn)
        .save();

    queries::get_product(&conn, &fsn)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".into()))
}

/// Delete a product and its unused keys. Refused once any key has been
/// issued, since buyers still look those up.
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(fsn): Path<String>,
) -> Result<StatusCode> {
    let mut conn = state.db.get()?;
    let unused = queries::delete_product(&mut conn, &fsn)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::DeleteProduct)
        .resource("product", &fsn)
        .details(&serde_json::json!({ "unused_keys_deleted": unused }))
        .save();

    Ok(StatusCode::NO_CONTENT)
}
