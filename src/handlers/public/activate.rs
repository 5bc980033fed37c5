use axum::{extract::State, http::HeaderMap};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::allocator::{RedeemRequest, Redemption};
use crate::db::{AppState, queries};
use crate::email::{self, KeyDelivery};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::handlers::{allocator, blocking};
use crate::models::{
    ActivationCode, ActorType, AuditAction, FulfillmentType, NotificationKind,
    NotificationStatus, Order, OrderId, ProductSummary,
};
use crate::util::{AuditLogBuilder, absolute_url, is_valid_email, normalize_indian_phone};

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    /// Order id or secret code, as typed by the buyer
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub order_id: String,
    pub fsn: Option<String>,
    pub fulfillment_type: FulfillmentType,
    pub product: Option<ProductSummary>,
    pub redeemed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    #[serde(flatten)]
    pub redemption: Redemption,
    /// Outcome of the key delivery email, when one was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<NotificationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SaveContactRequest {
    pub order_id: String,
    pub email: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveContactResponse {
    pub order_id: String,
    pub email: String,
    pub whatsapp: Option<String>,
}

/// Find the order an activation code refers to.
pub(crate) fn resolve_order(conn: &Connection, raw_code: &str) -> Result<Order> {
    let code = ActivationCode::parse(raw_code).ok_or_else(|| {
        AppError::BadRequest(
            "Enter an order ID (NNN-NNNNNNN-NNNNNNN) or the 15-17 digit secret code".into(),
        )
    })?;
    let order = match &code {
        ActivationCode::Order(id) => queries::get_order(conn, id.as_str())?,
        ActivationCode::Secret(secret) => queries::get_order_by_secret_code(conn, secret)?,
    };
    order.ok_or_else(|| AppError::NotFound("Order not found".into()))
}

/// Check an order and report whether it already has a key.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(input): Json<CodeRequest>,
) -> Result<Json<VerifyResponse>> {
    let conn = state.db.get()?;
    let order = resolve_order(&conn, &input.code)?;

    let (product, existing) = match order.fsn.as_deref() {
        Some(fsn) => (
            Some(
                queries::get_product(&conn, fsn)?
                    .map(|p| p.summary())
                    .unwrap_or_else(|| ProductSummary::fallback(fsn)),
            ),
            queries::get_key_by_fsn_and_order(&conn, fsn, &order.order_id)?,
        ),
        None => (None, None),
    };

    Ok(Json(VerifyResponse {
        valid: true,
        order_id: order.order_id,
        fsn: order.fsn,
        fulfillment_type: order.fulfillment_type,
        product,
        redeemed: existing.is_some(),
        license_key: existing.map(|k| k.license_key),
    }))
}

/// Issue (or re-issue) the key for an order and email it on first issue.
pub async fn redeem_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CodeRequest>,
) -> Result<Json<RedeemResponse>> {
    let order = {
        let conn = state.db.get()?;
        resolve_order(&conn, &input.code)?
    };
    let fsn = order.fsn.clone().ok_or_else(|| {
        AppError::BadRequest("This order has no product assigned yet, please contact support".into())
    })?;

    let alloc = allocator(&state);
    let request = RedeemRequest::new(fsn, order.order_id.clone());
    let redemption = blocking(move || alloc.redeem_key(&request).map_err(AppError::from)).await?;

    if !redemption.newly_redeemed {
        return Ok(Json(RedeemResponse {
            redemption,
            email_status: None,
        }));
    }

    // The key is committed; nothing below may turn this into an error.
    match state.db.get() {
        Ok(conn) => AuditLogBuilder::new(&conn, state.audit_log_enabled, &headers)
            .actor(ActorType::Public, None)
            .action(AuditAction::RedeemKey)
            .resource("license_key", &redemption.key_id)
            .details(&serde_json::json!({
                "fsn": redemption.fsn,
                "order_id": redemption.order_id,
            }))
            .save(),
        Err(e) => tracing::error!(
            order_id = %redemption.order_id,
            error = %e,
            "Skipping redemption audit entry"
        ),
    }

    let email_status = match order.contact_email.as_deref() {
        Some(to) => {
            let message = email::key_delivery(&KeyDelivery {
                product_name: &redemption.product.name,
                license_key: &redemption.license_key,
                order_id: &redemption.order_id,
                download_url: redemption.product.download_url.as_deref(),
                installation_url: redemption
                    .product
                    .installation_doc
                    .as_deref()
                    .map(|path| absolute_url(&state.base_url, path)),
                support_email: state.notifier.email().support_email(),
            });
            state
                .notifier
                .deliver(
                    NotificationKind::KeyDelivery,
                    to,
                    &message,
                    Some(&redemption.order_id),
                )
                .await
                .map(|n| n.status)
        }
        None => None,
    };

    Ok(Json(RedeemResponse {
        redemption,
        email_status,
    }))
}

/// Store the buyer's email and WhatsApp number on the order.
pub async fn save_contact(
    State(state): State<AppState>,
    Json(input): Json<SaveContactRequest>,
) -> Result<Json<SaveContactResponse>> {
    let order_id = OrderId::parse(&input.order_id)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let email = input.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    let whatsapp = match input.whatsapp.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(normalize_indian_phone(raw).ok_or_else(|| {
            AppError::BadRequest("WhatsApp number must be a 10-digit Indian mobile (+91)".into())
        })?),
        None => None,
    };

    let conn = state.db.get()?;
    if !queries::update_order_contact(&conn, order_id.as_str(), Some(&email), whatsapp.as_deref())? {
        return Err(AppError::NotFound("Order not found".into()));
    }

    Ok(Json(SaveContactResponse {
        order_id: order_id.to_string(),
        email,
        whatsapp,
    }))
}

/// Previously redeemed key for an order.
pub async fn lookup_redemption(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Redemption>> {
    let alloc = allocator(&state);
    blocking(move || alloc.lookup_redemption(&order_id).map_err(AppError::from))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No key has been redeemed for this order".into()))
}
