use axum::{extract::State, http::StatusCode};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    Customization, CustomizationEligibility, OrderId, SubmitCustomization, UsernameAvailability,
    UsernameQuery, normalize_username, validate_username,
};

const ELIGIBLE_FSN_PREFIX: &str = "OFFICE365";

#[derive(Debug, Serialize)]
pub struct CustomizationResponse {
    #[serde(flatten)]
    pub customization: Customization,
    pub email: String,
}

pub(crate) fn mailbox(username: &str, domain: &str) -> String {
    format!("{}@{}", username, domain)
}

fn eligibility(conn: &Connection, order_id: &OrderId) -> Result<CustomizationEligibility> {
    let refuse = |reason: &str| CustomizationEligibility {
        eligible: false,
        reason: Some(reason.to_string()),
        existing: None,
    };

    let Some(order) = queries::get_order(conn, order_id.as_str())? else {
        return Ok(refuse("Order not found"));
    };
    if !order
        .fsn
        .as_deref()
        .is_some_and(|fsn| fsn.to_ascii_uppercase().starts_with(ELIGIBLE_FSN_PREFIX))
    {
        return Ok(refuse(
            "Username customization is only available for Office 365 orders",
        ));
    }
    if queries::get_warranty_by_order(conn, order_id.as_str())?.is_none() {
        return Ok(refuse("Register your warranty before customizing your username"));
    }
    if let Some(existing) = queries::get_customization_by_order(conn, order_id.as_str())? {
        return Ok(CustomizationEligibility {
            eligible: false,
            reason: Some("A username has already been requested for this order".into()),
            existing: Some(existing),
        });
    }
    Ok(CustomizationEligibility {
        eligible: true,
        reason: None,
        existing: None,
    })
}

pub async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<UsernameAvailability>> {
    let username = normalize_username(&query.username);
    let email = mailbox(&username, &state.customization_domain);
    if let Err(reason) = validate_username(&username) {
        return Ok(Json(UsernameAvailability {
            username,
            email,
            available: false,
            reason: Some(reason.to_string()),
        }));
    }

    let conn = state.db.get()?;
    let taken = queries::username_taken(&conn, &username)?;
    Ok(Json(UsernameAvailability {
        username,
        email,
        available: !taken,
        reason: taken.then(|| "Username is already taken".to_string()),
    }))
}

pub async fn check_eligibility(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CustomizationEligibility>> {
    let order_id = OrderId::parse(&order_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let conn = state.db.get()?;
    Ok(Json(eligibility(&conn, &order_id)?))
}

pub async fn submit_customization(
    State(state): State<AppState>,
    Json(input): Json<SubmitCustomization>,
) -> Result<(StatusCode, Json<CustomizationResponse>)> {
    let order_id =
        OrderId::parse(&input.order_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let username = normalize_username(&input.username);
    validate_username(&username).map_err(|e| AppError::BadRequest(e.into()))?;
    let display_name = input
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let conn = state.db.get()?;
    let check = eligibility(&conn, &order_id)?;
    if !check.eligible {
        let reason = check.reason.unwrap_or_default();
        return Err(if check.existing.is_some() {
            AppError::Conflict(reason)
        } else {
            AppError::BadRequest(reason)
        });
    }

    // The unique index decides races between two buyers picking the same name
    let customization =
        queries::create_customization(&conn, order_id.as_str(), &username, display_name)?;
    tracing::info!(order_id = %order_id, username = %username, "Username customization requested");

    Ok((
        StatusCode::CREATED,
        Json(CustomizationResponse {
            email: mailbox(&customization.username, &state.customization_domain),
            customization,
        }),
    ))
}
