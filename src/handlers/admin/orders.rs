use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{
    Appeal, AuditAction, CreateOrder, Customization, LicenseKey, Order, OrderFilter, OrderId,
    WarrantyRegistration, is_secret_code,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::{is_valid_email, normalize_indian_phone};

/// Everything known about one order.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub license_key: Option<LicenseKey>,
    pub warranty: Option<WarrantyRegistration>,
    pub appeals: Vec<Appeal>,
    pub customization: Option<Customization>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(mut input): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order_id =
        OrderId::parse(&input.order_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if let Some(code) = &input.secret_code {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if !is_secret_code(&code) {
            return Err(AppError::BadRequest("Secret code must be 15-17 digits".into()));
        }
        input.secret_code = Some(code);
    }
    if input.quantity < 1 {
        return Err(AppError::BadRequest("Quantity must be at least 1".into()));
    }
    if let Some(email) = input.contact_email.as_deref() {
        if !is_valid_email(email) {
            return Err(AppError::BadRequest("Invalid email address".into()));
        }
    }
    if let Some(raw) = input.contact_phone.take() {
        input.contact_phone = Some(normalize_indian_phone(&raw).ok_or_else(|| {
            AppError::BadRequest("Phone must be a 10-digit Indian mobile (+91)".into())
        })?);
    }

    let conn = state.db.get()?;
    let order = queries::create_order(&conn, &order_id, &input)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::CreateOrder)
        .resource("order", &order.order_id)
        .details(&serde_json::json!({
            "fsn": order.fsn,
            "fulfillment_type": order.fulfillment_type,
        }))
        .save();

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Paginated<Order>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (orders, total) = queries::list_orders(&conn, &filter)?;
    Ok(Json(Paginated::new(orders, total, page.limit(), page.offset())))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderDetail>> {
    let order_id = OrderId::normalize(&order_id)
        .ok_or_else(|| AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into()))?;
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, order_id.as_str())?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let license_key = match order.fsn.as_deref() {
        Some(fsn) => queries::get_key_by_fsn_and_order(&conn, fsn, &order.order_id)?,
        None => queries::get_key_by_order(&conn, &order.order_id)?,
    };

    Ok(Json(OrderDetail {
        license_key,
        warranty: queries::get_warranty_by_order(&conn, &order.order_id)?,
        appeals: queries::list_appeals_for_order(&conn, &order.order_id)?,
        customization: queries::get_customization_by_order(&conn, &order.order_id)?,
        order,
    }))
}
