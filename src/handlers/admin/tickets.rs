use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::email;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{
    AdminReply, AuditAction, MessageAuthor, NotificationKind, NotificationStatus, Ticket,
    TicketFilter, TicketWithMessages, UpdateTicketStatus,
};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Serialize)]
pub struct AdminReplyResponse {
    #[serde(flatten)]
    pub ticket: TicketWithMessages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<NotificationStatus>,
}

fn load(conn: &rusqlite::Connection, id: &str) -> Result<TicketWithMessages> {
    let ticket = queries::get_ticket(conn, id)?
        .ok_or_else(|| AppError::NotFound("Ticket not found".into()))?;
    let messages = queries::list_ticket_messages(conn, &ticket.id)?;
    Ok(TicketWithMessages { ticket, messages })
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Paginated<Ticket>>> {
    let conn = state.db.get()?;
    let page = PaginationQuery::new(filter.limit, filter.offset);
    let (items, total) = queries::list_tickets(&conn, &filter)?;
    Ok(Json(Paginated::new(items, total, page.limit(), page.offset())))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TicketWithMessages>> {
    let conn = state.db.get()?;
    Ok(Json(load(&conn, &id)?))
}

/// Answer a ticket and email the reply to the customer.
pub async fn reply_ticket(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<AdminReply>,
) -> Result<Json<AdminReplyResponse>> {
    let body = input.message.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }

    let updated = {
        let mut conn = state.db.get()?;
        let ticket = queries::get_ticket(&conn, &id)?
            .ok_or_else(|| AppError::NotFound("Ticket not found".into()))?;
        let next = ticket
            .status
            .on_admin_reply()
            .map_err(|e| AppError::Conflict(e.to_string()))?;

        let tx = conn.transaction()?;
        queries::insert_ticket_message(&tx, &id, MessageAuthor::Admin, Some(&ctx.admin.id), body)?;
        queries::set_ticket_status(&tx, &id, next)?;
        tx.commit()?;

        ctx.audit(&conn, &state, &headers)
            .action(AuditAction::ReplyTicket)
            .resource("ticket", &id)
            .details(&serde_json::json!({ "reference": ticket.reference }))
            .save();

        load(&conn, &id)?
    };

    let message = email::ticket_reply(&updated.ticket.reference, &updated.ticket.subject, body);
    let email_status = state
        .notifier
        .deliver(
            NotificationKind::TicketReply,
            &updated.ticket.customer_email,
            &message,
            Some(&updated.ticket.id),
        )
        .await
        .map(|n| n.status);

    Ok(Json(AdminReplyResponse {
        ticket: updated,
        email_status,
    }))
}

pub async fn update_ticket_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateTicketStatus>,
) -> Result<Json<Ticket>> {
    let conn = state.db.get()?;
    let ticket = queries::get_ticket(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Ticket not found".into()))?;
    let next = ticket
        .status
        .transition(input.status)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    queries::set_ticket_status(&conn, &id, next)?;

    ctx.audit(&conn, &state, &headers)
        .action(AuditAction::UpdateTicketStatus)
        .resource("ticket", &id)
        .details(&serde_json::json!({ "from": ticket.status, "to": next }))
        .save();

    queries::get_ticket(&conn, &id)?
        .map(Json)
        .ok_or_else(|| AppError::Internal("Ticket vanished after update".into()))
}
