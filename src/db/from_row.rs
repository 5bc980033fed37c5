//! Row mapping. Each `*_COLS` constant lists columns in the order the matching
//! `FromRow` impl reads them.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Params, Row, types::Type};

use crate::error::Result;
use crate::models::*;

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    conn.query_row(sql, params, |row| T::from_row(row))
        .optional()
        .map_err(Into::into)
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Parse a strum enum stored as TEXT, surfacing bad values as a conversion error.
fn parse_enum<T: FromStr>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub const PRODUCT_COLS: &str =
    "fsn, title, download_url, installation_doc, image_url, created_at, updated_at";

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            fsn: row.get(0)?,
            title: row.get(1)?,
            download_url: row.get(2)?,
            installation_doc: row.get(3)?,
            image_url: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

pub const LICENSE_KEY_COLS: &str =
    "id, license_key, fsn, is_redeemed, order_id, created_at, redeemed_at, replaced_at";

impl FromRow for LicenseKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseKey {
            id: row.get(0)?,
            license_key: row.get(1)?,
            fsn: row.get(2)?,
            is_redeemed: row.get::<_, i32>(3)? != 0,
            order_id: row.get(4)?,
            created_at: row.get(5)?,
            redeemed_at: row.get(6)?,
            replaced_at: row.get(7)?,
        })
    }
}

pub const ORDER_COLS: &str = "id, order_id, secret_code, fsn, fulfillment_type, quantity, order_date, contact_email, contact_phone, warranty_blocked, created_at";

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            order_id: row.get(1)?,
            secret_code: row.get(2)?,
            fsn: row.get(3)?,
            fulfillment_type: parse_enum(row, 4)?,
            quantity: row.get(5)?,
            order_date: row.get(6)?,
            contact_email: row.get(7)?,
            contact_phone: row.get(8)?,
            warranty_blocked: row.get::<_, i32>(9)? != 0,
            created_at: row.get(10)?,
        })
    }
}

pub const WARRANTY_COLS: &str = "id, order_id, status, contact, customer_email, seller_feedback_proof, product_review_proof, missing_seller_feedback, missing_product_review, admin_notes, rejection_reason, reminder_count, created_at, updated_at, verified_at";

impl FromRow for WarrantyRegistration {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WarrantyRegistration {
            id: row.get(0)?,
            order_id: row.get(1)?,
            status: parse_enum(row, 2)?,
            contact: row.get(3)?,
            customer_email: row.get(4)?,
            seller_feedback_proof: row.get(5)?,
            product_review_proof: row.get(6)?,
            missing_seller_feedback: row.get::<_, i32>(7)? != 0,
            missing_product_review: row.get::<_, i32>(8)? != 0,
            admin_notes: row.get(9)?,
            rejection_reason: row.get(10)?,
            reminder_count: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            verified_at: row.get(14)?,
        })
    }
}

pub const APPEAL_COLS: &str = "id, order_id, kind, status, proof, customer_phone, refund_preference, refund_amount, admin_notes, initiated_by_admin, created_at, updated_at";

impl FromRow for Appeal {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Appeal {
            id: row.get(0)?,
            order_id: row.get(1)?,
            kind: parse_enum(row, 2)?,
            status: parse_enum(row, 3)?,
            proof: row.get(4)?,
            customer_phone: row.get(5)?,
            refund_preference: parse_enum(row, 6)?,
            refund_amount: row.get(7)?,
            admin_notes: row.get(8)?,
            initiated_by_admin: row.get::<_, i32>(9)? != 0,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

pub const REPLACEMENT_COLS: &str = "id, order_id, fsn, customer_email, proof, status, admin_notes, original_key_id, new_key_id, created_at, reviewed_at, reviewed_by";

impl FromRow for ReplacementRequest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ReplacementRequest {
            id: row.get(0)?,
            order_id: row.get(1)?,
            fsn: row.get(2)?,
            customer_email: row.get(3)?,
            proof: row.get(4)?,
            status: parse_enum(row, 5)?,
            admin_notes: row.get(6)?,
            original_key_id: row.get(7)?,
            new_key_id: row.get(8)?,
            created_at: row.get(9)?,
            reviewed_at: row.get(10)?,
            reviewed_by: row.get(11)?,
        })
    }
}

pub const CUSTOMIZATION_COLS: &str =
    "id, order_id, username, display_name, status, generated_email, created_at, completed_at";

impl FromRow for Customization {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Customization {
            id: row.get(0)?,
            order_id: row.get(1)?,
            username: row.get(2)?,
            display_name: row.get(3)?,
            status: parse_enum(row, 4)?,
            generated_email: row.get(5)?,
            created_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }
}

pub const TICKET_COLS: &str = "id, reference, customer_email, customer_name, order_id, subject, category, priority, status, created_at, updated_at, resolved_at";

impl FromRow for Ticket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Ticket {
            id: row.get(0)?,
            reference: row.get(1)?,
            customer_email: row.get(2)?,
            customer_name: row.get(3)?,
            order_id: row.get(4)?,
            subject: row.get(5)?,
            category: parse_enum(row, 6)?,
            priority: parse_enum(row, 7)?,
            status: parse_enum(row, 8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            resolved_at: row.get(11)?,
        })
    }
}

pub const TICKET_MESSAGE_COLS: &str = "id, ticket_id, author, author_id, body, created_at";

impl FromRow for TicketMessage {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TicketMessage {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            author: parse_enum(row, 2)?,
            author_id: row.get(3)?,
            body: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

pub const NOTIFICATION_COLS: &str = "id, kind, recipient, subject, text_body, html_body, reference_id, status, attempts, last_error, created_at, sent_at";

impl FromRow for Notification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Notification {
            id: row.get(0)?,
            kind: parse_enum(row, 1)?,
            recipient: row.get(2)?,
            subject: row.get(3)?,
            text_body: row.get(4)?,
            html_body: row.get(5)?,
            reference_id: row.get(6)?,
            status: parse_enum(row, 7)?,
            attempts: row.get(8)?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            sent_at: row.get(11)?,
        })
    }
}

pub const ADMIN_COLS: &str =
    "id, email, name, role, api_key_prefix, api_key_hash, created_at, created_by";

impl FromRow for Admin {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Admin {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: parse_enum(row, 3)?,
            api_key_prefix: row.get(4)?,
            api_key_hash: row.get(5)?,
            created_at: row.get(6)?,
            created_by: row.get(7)?,
        })
    }
}

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, actor_id, actor_email, action, resource_type, resource_id, details, ip_address, user_agent";

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(8)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2)?,
            actor_id: row.get(3)?,
            actor_email: row.get(4)?,
            action: row.get(5)?,
            resource_type: row.get(6)?,
            resource_id: row.get(7)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            ip_address: row.get(9)?,
            user_agent: row.get(10)?,
        })
    }
}
