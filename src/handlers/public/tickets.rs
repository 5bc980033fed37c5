use axum::{extract::State, http::StatusCode};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    CreateTicket, CustomerReply, CustomerTicketQuery, MessageAuthor, OrderId, Ticket,
    TicketWithMessages,
};
use crate::util::is_valid_email;

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(email)
}

/// Load a ticket and check it belongs to `email`. Someone else's ticket looks
/// the same as a missing one.
fn owned_ticket(conn: &rusqlite::Connection, id: &str, email: &str) -> Result<Ticket> {
    queries::get_ticket(conn, id)?
        .filter(|t| t.customer_email.eq_ignore_ascii_case(email))
        .ok_or_else(|| AppError::NotFound("Ticket not found".into()))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Json(mut input): Json<CreateTicket>,
) -> Result<(StatusCode, Json<TicketWithMessages>)> {
    input.customer_email = normalize_email(&input.customer_email)?;
    input.subject = input.subject.trim().to_string();
    if input.subject.is_empty() {
        return Err(AppError::BadRequest("Subject is required".into()));
    }
    if input.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }
    if let Some(raw) = input.order_id.take().filter(|s| !s.trim().is_empty()) {
        let order_id = OrderId::normalize(&raw).ok_or_else(|| {
            AppError::BadRequest("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN".into())
        })?;
        input.order_id = Some(order_id.to_string());
    }

    let mut conn = state.db.get()?;
    let created = queries::create_ticket(&mut conn, &input)?;
    tracing::info!(
        reference = %created.ticket.reference,
        category = created.ticket.category.as_ref(),
        "Support ticket opened"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_my_tickets(
    State(state): State<AppState>,
    Query(query): Query<CustomerTicketQuery>,
) -> Result<Json<Vec<Ticket>>> {
    let email = normalize_email(&query.email)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_tickets_for_email(&conn, &email)?))
}

pub async fn get_my_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CustomerTicketQuery>,
) -> Result<Json<TicketWithMessages>> {
    let email = normalize_email(&query.email)?;
    let conn = state.db.get()?;
    let ticket = owned_ticket(&conn, &id, &email)?;
    let messages = queries::list_ticket_messages(&conn, &ticket.id)?;
    Ok(Json(TicketWithMessages { ticket, messages }))
}

pub async fn reply_to_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CustomerReply>,
) -> Result<Json<TicketWithMessages>> {
    let email = normalize_email(&input.email)?;
    if input.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }

    let mut conn = state.db.get()?;
    let ticket = owned_ticket(&conn, &id, &email)?;
    let next = ticket
        .status
        .on_customer_reply()
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    let tx = conn.transaction()?;
    queries::insert_ticket_message(&tx, &ticket.id, MessageAuthor::Customer, None, &input.message)?;
    queries::set_ticket_status(&tx, &ticket.id, next)?;
    tx.commit()?;

    let ticket = queries::get_ticket(&conn, &ticket.id)?
        .ok_or_else(|| AppError::Internal("Ticket vanished after reply".into()))?;
    let messages = queries::list_ticket_messages(&conn, &ticket.id)?;
    Ok(Json(TicketWithMessages { ticket, messages }))
}
