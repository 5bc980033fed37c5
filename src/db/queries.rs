use chrono::Utc;
use rusqlite::{
    Connection, OptionalExtension, TransactionBehavior, params, params_from_iter, types::Value,
};
use uuid::Uuid;

use crate::error::{AppError, Result, is_unique_violation};
use crate::models::*;
use crate::pagination::PaginationQuery;

use super::from_row::{
    ADMIN_COLS, APPEAL_COLS, AUDIT_LOG_COLS, CUSTOMIZATION_COLS, LICENSE_KEY_COLS,
    NOTIFICATION_COLS, ORDER_COLS, PRODUCT_COLS, REPLACEMENT_COLS, TICKET_COLS,
    TICKET_MESSAGE_COLS, WARRANTY_COLS, query_all, query_one,
};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// SHA-256 hex digest used for stored API keys.
pub fn hash_secret(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"keydesk-api-key-v1:");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    key_column: &'static str,
    key: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, key: &str) -> Self {
        Self {
            table,
            key_column: "id",
            key: key.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    /// Match rows on a column other than `id`.
    fn keyed_by(mut self, column: &'static str) -> Self {
        self.key_column = column;
        self
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Some(Some(v)) sets v, Some(None) sets NULL, None leaves the column alone.
    fn set_nullable<V: Into<Value>>(self, column: &'static str, value: Option<Option<V>>) -> Self {
        match value {
            Some(Some(v)) => self.set(column, v),
            Some(None) => self.set(column, Value::Null),
            None => self,
        }
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.key.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table,
            sets.join(", "),
            self.key_column
        );
        let affected = conn.execute(&sql, params_from_iter(values))?;
        Ok(affected > 0)
    }
}

/// WHERE clause assembled from optional filters, shared by COUNT and SELECT.
#[derive(Default)]
struct Filters {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filters {
    fn eq(mut self, column: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(v) = value {
            self.clauses.push(format!("{} = ?", column));
            self.values.push(v.into());
        }
        self
    }

    fn raw(mut self, clause: &str, values: Vec<Value>) -> Self {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
        self
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Run `SELECT COUNT(*)` and a paginated `SELECT cols` over the same filter.
    fn page<T: super::from_row::FromRow>(
        self,
        conn: &Connection,
        table: &str,
        cols: &str,
        order_by: &str,
        page: PaginationQuery,
    ) -> Result<(Vec<T>, i64)> {
        let where_sql = self.where_sql();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} {}", table, where_sql),
            params_from_iter(self.values.iter()),
            |row| row.get(0),
        )?;
        let mut values = self.values;
        values.push(page.limit().into());
        values.push(page.offset().into());
        let items = query_all(
            conn,
            &format!(
                "SELECT {} FROM {} {} ORDER BY {} LIMIT ? OFFSET ?",
                cols, table, where_sql, order_by
            ),
            params_from_iter(values),
        )?;
        Ok((items, total))
    }
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let now = now();
    conn.execute(
        "INSERT INTO products (fsn, title, download_url, installation_doc, image_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &input.fsn,
            &input.title,
            &input.download_url,
            &input.installation_doc,
            &input.image_url,
            now,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Product {} already exists", input.fsn))
        } else {
            e.into()
        }
    })?;

    Ok(Product {
        fsn: input.fsn.clone(),
        title: input.title.clone(),
        download_url: input.download_url.clone(),
        installation_doc: input.installation_doc.clone(),
        image_url: input.image_url.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_product(conn: &Connection, fsn: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE fsn = ?1", PRODUCT_COLS),
        params![fsn],
    )
}

pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!("SELECT {} FROM products ORDER BY title", PRODUCT_COLS),
        [],
    )
}

pub fn update_product(conn: &Connection, fsn: &str, input: &UpdateProduct) -> Result<bool> {
    UpdateBuilder::new("products", fsn)
        .keyed_by("fsn")
        .with_updated_at()
        .set_opt("title", input.title.clone())
        .set_nullable("download_url", input.download_url.clone())
        .set_nullable("installation_doc", input.installation_doc.clone())
        .set_nullable("image_url", input.image_url.clone())
        .execute(conn)
}

/// Delete a product and its unused keys. Callers check for redeemed keys first.
/// Delete a product and its unused keys. Returns the number of keys removed.
///
/// The redeemed-key check runs under the write lock, so a redemption cannot
/// land between the check and the delete.
pub fn delete_product(conn: &mut Connection, fsn: &str) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if get_product(&tx, fsn)?.is_none() {
        return Err(AppError::NotFound("Product not found".into()));
    }
    let redeemed = count_redeemed_keys_for_fsn(&tx, fsn)?;
    if redeemed > 0 {
        return Err(AppError::Conflict(format!(
            "Product has {} redeemed keys and cannot be deleted",
            redeemed
        )));
    }
    let unused = tx.execute(
        "DELETE FROM license_keys WHERE fsn = ?1 AND is_redeemed = 0",
        params![fsn],
    )?;
    tx.execute("DELETE FROM products WHERE fsn = ?1", params![fsn])?;
    tx.commit()?;
    Ok(unused)
}

// ============ License keys ============

pub fn insert_license_key(conn: &Connection, fsn: &str, license_key: &str) -> Result<LicenseKey> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO license_keys (id, license_key, fsn, is_redeemed, order_id, created_at, redeemed_at)
         VALUES (?1, ?2, ?3, 0, NULL, ?4, NULL)",
        params![&id, license_key, fsn, now],
    )?;
    Ok(LicenseKey {
        id,
        license_key: license_key.to_string(),
        fsn: fsn.to_string(),
        is_redeemed: false,
        order_id: None,
        created_at: now,
        redeemed_at: None,
        replaced_at: None,
    })
}

pub fn get_license_key(conn: &Connection, id: &str) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!("SELECT {} FROM license_keys WHERE id = ?1", LICENSE_KEY_COLS),
        params![id],
    )
}

pub fn get_key_by_fsn_and_order(
    conn: &Connection,
    fsn: &str,
    order_id: &str,
) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE fsn = ?1 AND order_id = ?2 AND replaced_at IS NULL",
            LICENSE_KEY_COLS
        ),
        params![fsn, order_id],
    )
}

/// First live key redeemed for an order, across product lines.
pub fn get_key_by_order(conn: &Connection, order_id: &str) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_keys
             WHERE order_id = ?1 AND is_redeemed = 1 AND replaced_at IS NULL
             ORDER BY redeemed_at ASC LIMIT 1",
            LICENSE_KEY_COLS
        ),
        params![order_id],
    )
}

/// Mark one available key of `fsn` as redeemed for `order_id` in a single
/// conditional statement. Returns None when the pool is empty.
pub fn claim_available_key(
    conn: &Connection,
    fsn: &str,
    order_id: &str,
    redeemed_at: i64,
) -> Result<Option<LicenseKey>> {
    conn.query_row(
        &format!(
            "UPDATE license_keys
             SET is_redeemed = 1, order_id = ?1, redeemed_at = ?2
             WHERE id = (SELECT id FROM license_keys WHERE fsn = ?3 AND is_redeemed = 0 LIMIT 1)
               AND is_redeemed = 0
             RETURNING {}",
            LICENSE_KEY_COLS
        ),
        params![order_id, redeemed_at, fsn],
        |row| <LicenseKey as super::from_row::FromRow>::from_row(row),
    )
    .optional()
    .map_err(Into::into)
}

pub fn count_keys_for_fsn(conn: &Connection, fsn: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM license_keys WHERE fsn = ?1",
        params![fsn],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn count_redeemed_keys_for_fsn(conn: &Connection, fsn: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM license_keys WHERE fsn = ?1 AND is_redeemed = 1",
        params![fsn],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn list_license_keys(
    conn: &Connection,
    filter: &LicenseKeyFilter,
) -> Result<(Vec<LicenseKey>, i64)> {
    let mut filters = Filters::default()
        .eq("fsn", filter.fsn.clone())
        .eq("is_redeemed", filter.redeemed.map(i64::from));
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        filters = filters.raw(
            "(license_key LIKE ? OR order_id LIKE ?)",
            vec![pattern.clone().into(), pattern.into()],
        );
    }
    filters.page(
        conn,
        "license_keys",
        LICENSE_KEY_COLS,
        "created_at DESC",
        PaginationQuery::new(filter.limit, filter.offset),
    )
}

/// Per-FSN stock counts, including catalog products with an empty pool.
pub fn key_stock_stats(conn: &Connection) -> Result<Vec<KeyStockStats>> {
    let mut stmt = conn.prepare(
        "SELECT s.fsn, p.title, s.total, s.available, s.redeemed FROM (
             SELECT fsn,
                    COUNT(*) AS total,
                    SUM(CASE WHEN is_redeemed = 0 THEN 1 ELSE 0 END) AS available,
                    SUM(CASE WHEN is_redeemed = 1 THEN 1 ELSE 0 END) AS redeemed
             FROM license_keys GROUP BY fsn
             UNION ALL
             SELECT fsn, 0, 0, 0 FROM products
             WHERE fsn NOT IN (SELECT DISTINCT fsn FROM license_keys)
         ) s
         LEFT JOIN products p ON p.fsn = s.fsn
         ORDER BY s.fsn",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(KeyStockStats {
            fsn: row.get(0)?,
            title: row.get(1)?,
            total: row.get(2)?,
            available: row.get(3)?,
            redeemed: row.get(4)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Delete the given keys, skipping any that have been redeemed.
pub fn purge_unused_keys_by_ids(conn: &mut Connection, ids: &[String]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut deleted = 0;
    {
        let mut stmt =
            tx.prepare("DELETE FROM license_keys WHERE id = ?1 AND is_redeemed = 0")?;
        for id in ids {
            deleted += stmt.execute(params![id])?;
        }
    }
    tx.commit()?;
    Ok(deleted)
}

pub fn purge_unused_keys_by_fsn(conn: &Connection, fsn: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM license_keys WHERE fsn = ?1 AND is_redeemed = 0",
        params![fsn],
    )
    .map_err(Into::into)
}

pub fn delete_unused_key(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM license_keys WHERE id = ?1 AND is_redeemed = 0",
        params![id],
    )?;
    Ok(deleted > 0)
}

// ============ Orders ============

pub fn create_order(conn: &Connection, order_id: &OrderId, input: &CreateOrder) -> Result<Order> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO orders (id, order_id, secret_code, fsn, fulfillment_type, quantity, order_date, contact_email, contact_phone, warranty_blocked, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
        params![
            &id,
            order_id.as_str(),
            &input.secret_code,
            &input.fsn,
            input.fulfillment_type.as_ref(),
            input.quantity,
            input.order_date,
            &input.contact_email,
            &input.contact_phone,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Order {} already exists", order_id))
        } else {
            e.into()
        }
    })?;

    Ok(Order {
        id,
        order_id: order_id.to_string(),
        secret_code: input.secret_code.clone(),
        fsn: input.fsn.clone(),
        fulfillment_type: input.fulfillment_type,
        quantity: input.quantity,
        order_date: input.order_date,
        contact_email: input.contact_email.clone(),
        contact_phone: input.contact_phone.clone(),
        warranty_blocked: false,
        created_at: now,
    })
}

pub fn get_order(conn: &Connection, order_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE order_id = ?1", ORDER_COLS),
        params![order_id],
    )
}

pub fn get_order_by_secret_code(conn: &Connection, secret_code: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE secret_code = ?1", ORDER_COLS),
        params![secret_code],
    )
}

pub fn list_orders(conn: &Connection, filter: &OrderFilter) -> Result<(Vec<Order>, i64)> {
    Filters::default()
        .eq("fsn", filter.fsn.clone())
        .eq(
            "fulfillment_type",
            filter.fulfillment_type.map(|f| f.as_ref().to_string()),
        )
        .eq("warranty_blocked", filter.blocked.map(i64::from))
        .page(
            conn,
            "orders",
            ORDER_COLS,
            "created_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

pub fn update_order_contact(
    conn: &Connection,
    order_id: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<bool> {
    UpdateBuilder::new("orders", order_id)
        .keyed_by("order_id")
        .set_opt("contact_email", email.map(String::from))
        .set_opt("contact_phone", phone.map(String::from))
        .execute(conn)
}

pub fn set_warranty_blocked(conn: &Connection, order_id: &str, blocked: bool) -> Result<bool> {
    UpdateBuilder::new("orders", order_id)
        .keyed_by("order_id")
        .set("warranty_blocked", blocked as i64)
        .execute(conn)
}

// ============ Warranty ============

pub fn create_warranty(
    conn: &Connection,
    order_id: &str,
    input: &SubmitWarranty,
) -> Result<WarrantyRegistration> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO warranty_registrations (id, order_id, status, contact, customer_email, seller_feedback_proof, product_review_proof, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            order_id,
            WarrantyStatus::Pending.as_ref(),
            &input.contact,
            &input.customer_email,
            &input.seller_feedback_proof,
            &input.product_review_proof,
            now,
            now
        ],
    )?;

    Ok(WarrantyRegistration {
        id,
        order_id: order_id.to_string(),
        status: WarrantyStatus::Pending,
        contact: input.contact.clone(),
        customer_email: input.customer_email.clone(),
        seller_feedback_proof: Some(input.seller_feedback_proof.clone()),
        product_review_proof: Some(input.product_review_proof.clone()),
        missing_seller_feedback: false,
        missing_product_review: false,
        admin_notes: None,
        rejection_reason: None,
        reminder_count: 0,
        created_at: now,
        updated_at: now,
        verified_at: None,
    })
}

pub fn get_warranty(conn: &Connection, id: &str) -> Result<Option<WarrantyRegistration>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM warranty_registrations WHERE id = ?1",
            WARRANTY_COLS
        ),
        params![id],
    )
}

pub fn get_warranty_by_order(
    conn: &Connection,
    order_id: &str,
) -> Result<Option<WarrantyRegistration>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM warranty_registrations WHERE order_id = ?1",
            WARRANTY_COLS
        ),
        params![order_id],
    )
}

pub fn list_warranties(
    conn: &Connection,
    filter: &WarrantyFilter,
) -> Result<(Vec<WarrantyRegistration>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .page(
            conn,
            "warranty_registrations",
            WARRANTY_COLS,
            "created_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

/// Apply an admin decision if the registration is still in `from`.
/// Returns false when another reviewer got there first.
pub fn apply_warranty_decision(
    conn: &Connection,
    id: &str,
    from: WarrantyStatus,
    decision: WarrantyDecision,
    to: WarrantyStatus,
    admin_notes: Option<&str>,
) -> Result<bool> {
    let now = now();
    let affected = match decision {
        WarrantyDecision::Approve => conn.execute(
            "UPDATE warranty_registrations
             SET status = ?1, admin_notes = COALESCE(?2, admin_notes), verified_at = ?3,
                 missing_seller_feedback = 0, missing_product_review = 0, updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![to.as_ref(), admin_notes, now, id, from.as_ref()],
        )?,
        WarrantyDecision::Reject => conn.execute(
            "UPDATE warranty_registrations
             SET status = ?1, admin_notes = COALESCE(?2, admin_notes), rejection_reason = ?2,
                 updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![to.as_ref(), admin_notes, now, id, from.as_ref()],
        )?,
        WarrantyDecision::RequestResubmission {
            missing_seller_feedback,
            missing_product_review,
        } => conn.execute(
            "UPDATE warranty_registrations
             SET status = ?1, admin_notes = COALESCE(?2, admin_notes),
                 missing_seller_feedback = ?3, missing_product_review = ?4,
                 reminder_count = 0, updated_at = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                to.as_ref(),
                admin_notes,
                missing_seller_feedback as i64,
                missing_product_review as i64,
                now,
                id,
                from.as_ref()
            ],
        )?,
    };
    Ok(affected > 0)
}

/// Replace the flagged proofs and move back to pending.
pub fn resubmit_warranty(
    conn: &Connection,
    id: &str,
    seller_feedback_proof: Option<&str>,
    product_review_proof: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE warranty_registrations
         SET status = ?1,
             seller_feedback_proof = COALESCE(?2, seller_feedback_proof),
             product_review_proof = COALESCE(?3, product_review_proof),
             missing_seller_feedback = 0, missing_product_review = 0, updated_at = ?4
         WHERE id = ?5 AND status = ?6",
        params![
            WarrantyStatus::Pending.as_ref(),
            seller_feedback_proof,
            product_review_proof,
            now(),
            id,
            WarrantyStatus::NeedsResubmission.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

// ============ Appeals ============

pub fn get_appeal(conn: &Connection, id: &str) -> Result<Option<Appeal>> {
    query_one(
        conn,
        &format!("SELECT {} FROM appeals WHERE id = ?1", APPEAL_COLS),
        params![id],
    )
}

pub fn get_appeal_by_order(
    conn: &Connection,
    order_id: &str,
    kind: AppealKind,
) -> Result<Option<Appeal>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM appeals WHERE order_id = ?1 AND kind = ?2",
            APPEAL_COLS
        ),
        params![order_id, kind.as_ref()],
    )
}

pub fn list_appeals_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Appeal>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM appeals WHERE order_id = ?1 ORDER BY created_at",
            APPEAL_COLS
        ),
        params![order_id],
    )
}

pub fn list_appeals(conn: &Connection, filter: &AppealFilter) -> Result<(Vec<Appeal>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .eq("kind", filter.kind.map(|k| k.as_ref().to_string()))
        .page(
            conn,
            "appeals",
            APPEAL_COLS,
            "updated_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

/// Insert or reopen a customer appeal as pending with fresh proof. Only
/// rejected or resubmit appeals are reopened; returns None when an existing
/// appeal is pending or approved.
pub fn upsert_customer_appeal(
    conn: &Connection,
    order_id: &str,
    input: &SubmitAppeal,
    refund_amount: Option<f64>,
) -> Result<Option<Appeal>> {
    let now = now();
    let changed = conn.execute(
        "INSERT INTO appeals (id, order_id, kind, status, proof, customer_phone, refund_preference, refund_amount, initiated_by_admin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
         ON CONFLICT (order_id, kind) DO UPDATE SET
             status = excluded.status,
             proof = excluded.proof,
             customer_phone = COALESCE(excluded.customer_phone, appeals.customer_phone),
             refund_preference = excluded.refund_preference,
             refund_amount = excluded.refund_amount,
             updated_at = excluded.updated_at
         WHERE appeals.status IN (?10, ?11)",
        params![
            gen_id(),
            order_id,
            input.kind.as_ref(),
            AppealStatus::Pending.as_ref(),
            &input.proof,
            &input.customer_phone,
            input.refund_preference.as_ref(),
            refund_amount,
            now,
            AppealStatus::Rejected.as_ref(),
            AppealStatus::Resubmit.as_ref()
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_appeal_by_order(conn, order_id, input.kind)
}

/// Admin-opened appeal: pending, flagged as admin initiated.
pub fn upsert_admin_appeal(
    conn: &Connection,
    order_id: &str,
    input: &InitiateAppeal,
) -> Result<Appeal> {
    let now = now();
    conn.execute(
        "INSERT INTO appeals (id, order_id, kind, status, customer_phone, admin_notes, initiated_by_admin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
         ON CONFLICT (order_id, kind) DO UPDATE SET
             status = excluded.status,
             customer_phone = COALESCE(excluded.customer_phone, appeals.customer_phone),
             admin_notes = COALESCE(excluded.admin_notes, appeals.admin_notes),
             initiated_by_admin = 1,
             updated_at = excluded.updated_at",
        params![
            gen_id(),
            order_id,
            input.kind.as_ref(),
            AppealStatus::Pending.as_ref(),
            &input.customer_phone,
            &input.admin_notes,
            now
        ],
    )?;
    get_appeal_by_order(conn, order_id, input.kind)?
        .ok_or_else(|| AppError::Internal("Appeal missing after upsert".into()))
}

/// Move an appeal from `from` to `to`. `clear_proof` drops the screenshot so
/// the customer has to upload a new one.
pub fn update_appeal_status(
    conn: &Connection,
    id: &str,
    from: AppealStatus,
    to: AppealStatus,
    admin_notes: Option<&str>,
    clear_proof: bool,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE appeals
         SET status = ?1, admin_notes = COALESCE(?2, admin_notes),
             proof = CASE WHEN ?3 THEN NULL ELSE proof END, updated_at = ?4
         WHERE id = ?5 AND status = ?6",
        params![to.as_ref(), admin_notes, clear_proof, now(), id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

pub fn appeal_stats(conn: &Connection) -> Result<AppealStats> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM appeals GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut stats = AppealStats::default();
    for row in rows {
        let (status, count) = row?;
        stats.total += count;
        match status.parse::<AppealStatus>() {
            Ok(AppealStatus::Pending) => stats.pending = count,
            Ok(AppealStatus::Approved) => stats.approved = count,
            Ok(AppealStatus::Rejected) => stats.rejected = count,
            Ok(AppealStatus::Resubmit) => stats.resubmit = count,
            Err(_) => tracing::warn!(status = %status, "Unknown appeal status in database"),
        }
    }
    Ok(stats)
}

// ============ Replacement requests ============

pub fn get_replacement(conn: &Connection, id: &str) -> Result<Option<ReplacementRequest>> {
    query_one(
        conn,
        &format!("SELECT {} FROM replacement_requests WHERE id = ?1", REPLACEMENT_COLS),
        params![id],
    )
}

/// Newest first.
pub fn list_replacements_for_order(
    conn: &Connection,
    order_id: &str,
) -> Result<Vec<ReplacementRequest>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM replacement_requests WHERE order_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            REPLACEMENT_COLS
        ),
        params![order_id],
    )
}

pub fn list_replacements(
    conn: &Connection,
    filter: &ReplacementFilter,
) -> Result<(Vec<ReplacementRequest>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .page(
            conn,
            "replacement_requests",
            REPLACEMENT_COLS,
            "created_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

/// Open a pending request against the order's current key.
pub fn create_replacement(
    conn: &Connection,
    original: &LicenseKey,
    order_id: &str,
    customer_email: &str,
    proof: &str,
) -> Result<ReplacementRequest> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO replacement_requests (id, order_id, fsn, customer_email, proof, status, original_key_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            order_id,
            &original.fsn,
            customer_email,
            proof,
            ReplacementStatus::Pending.as_ref(),
            &original.id,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(
                "A replacement request for this order is already waiting for review".into(),
            )
        } else {
            e.into()
        }
    })?;

    Ok(ReplacementRequest {
        id,
        order_id: order_id.to_string(),
        fsn: original.fsn.clone(),
        customer_email: customer_email.to_string(),
        proof: proof.to_string(),
        status: ReplacementStatus::Pending,
        admin_notes: None,
        original_key_id: original.id.clone(),
        new_key_id: None,
        created_at: now,
        reviewed_at: None,
        reviewed_by: None,
    })
}

/// Close a pending request without issuing a key.
pub fn reject_replacement(
    conn: &Connection,
    id: &str,
    admin_notes: &str,
    reviewed_by: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE replacement_requests
         SET status = ?1, admin_notes = ?2, reviewed_at = ?3, reviewed_by = ?4
         WHERE id = ?5 AND status = ?6",
        params![
            ReplacementStatus::Rejected.as_ref(),
            admin_notes,
            now(),
            reviewed_by,
            id,
            ReplacementStatus::Pending.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

/// Retire the request's original key and bind a fresh one to the order, in
/// one write transaction. The original stays redeemed with `replaced_at`
/// set, which frees the order's live-key slot for the new key.
///
/// `key_id` picks a specific available key of the same product; otherwise
/// the first available key is claimed.
pub fn approve_replacement(
    conn: &mut Connection,
    id: &str,
    key_id: Option<&str>,
    admin_notes: Option<&str>,
    reviewed_by: &str,
) -> Result<(ReplacementRequest, LicenseKey)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let request = get_replacement(&tx, id)?
        .ok_or_else(|| AppError::NotFound("Replacement request not found".into()))?;
    request
        .status
        .decide(ReplacementDecision::Approve)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    let now = now();

    let retired = tx.execute(
        "UPDATE license_keys SET replaced_at = ?1
         WHERE id = ?2 AND order_id = ?3 AND is_redeemed = 1 AND replaced_at IS NULL",
        params![now, &request.original_key_id, &request.order_id],
    )?;
    if retired == 0 {
        return Err(AppError::Conflict(
            "The original key is no longer the order's current key".into(),
        ));
    }

    let new_key = match key_id {
        Some(key_id) => {
            let candidate = get_license_key(&tx, key_id)?
                .ok_or_else(|| AppError::NotFound("License key not found".into()))?;
            if candidate.fsn != request.fsn {
                return Err(AppError::BadRequest(
                    "Selected license key belongs to a different product".into(),
                ));
            }
            if candidate.state() != KeyState::Available {
                return Err(AppError::BadRequest(
                    "Selected license key is already redeemed, choose an available key".into(),
                ));
            }
            tx.query_row(
                &format!(
                    "UPDATE license_keys SET is_redeemed = 1, order_id = ?1, redeemed_at = ?2
                     WHERE id = ?3 AND is_redeemed = 0
                     RETURNING {}",
                    LICENSE_KEY_COLS
                ),
                params![&request.order_id, now, key_id],
                |row| <LicenseKey as super::from_row::FromRow>::from_row(row),
            )
            .optional()?
            .ok_or_else(|| AppError::Conflict("Selected license key was just taken".into()))?
        }
        None => claim_available_key(&tx, &request.fsn, &request.order_id, now)?.ok_or_else(
            || AppError::NoKeyAvailable(format!("No license keys available for {}", request.fsn)),
        )?,
    };

    tx.execute(
        "UPDATE replacement_requests
         SET status = ?1, admin_notes = ?2, new_key_id = ?3, reviewed_at = ?4, reviewed_by = ?5
         WHERE id = ?6 AND status = ?7",
        params![
            ReplacementStatus::Approved.as_ref(),
            admin_notes.unwrap_or("Replacement approved"),
            &new_key.id,
            now,
            reviewed_by,
            id,
            ReplacementStatus::Pending.as_ref()
        ],
    )?;
    let request = get_replacement(&tx, id)?
        .ok_or_else(|| AppError::Internal("Replacement request vanished during approval".into()))?;
    tx.commit()?;
    Ok((request, new_key))
}

pub fn replacement_stats(conn: &Connection) -> Result<ReplacementStats> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM replacement_requests GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut stats = ReplacementStats::default();
    for row in rows {
        let (status, count) = row?;
        stats.total += count;
        match status.parse::<ReplacementStatus>() {
            Ok(ReplacementStatus::Pending) => stats.pending = count,
            Ok(ReplacementStatus::Approved) => stats.approved = count,
            Ok(ReplacementStatus::Rejected) => stats.rejected = count,
            Err(_) => tracing::warn!(status = %status, "Unknown replacement status in database"),
        }
    }
    Ok(stats)
}

/// Up to `limit` unredeemed keys of a product, for picking a replacement.
pub fn list_available_keys(conn: &Connection, fsn: &str, limit: i64) -> Result<Vec<LicenseKey>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_keys WHERE fsn = ?1 AND is_redeemed = 0
             ORDER BY created_at LIMIT ?2",
            LICENSE_KEY_COLS
        ),
        params![fsn, limit],
    )
}

// ============ Customizations ============

pub fn create_customization(
    conn: &Connection,
    order_id: &str,
    username: &str,
    display_name: Option<&str>,
) -> Result<Customization> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO customizations (id, order_id, username, display_name, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            order_id,
            username,
            display_name,
            CustomizationStatus::Pending.as_ref(),
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username is taken or a request already exists for this order".into())
        } else {
            e.into()
        }
    })?;

    Ok(Customization {
        id,
        order_id: order_id.to_string(),
        username: username.to_string(),
        display_name: display_name.map(String::from),
        status: CustomizationStatus::Pending,
        generated_email: None,
        created_at: now,
        completed_at: None,
    })
}

pub fn get_customization(conn: &Connection, id: &str) -> Result<Option<Customization>> {
    query_one(
        conn,
        &format!("SELECT {} FROM customizations WHERE id = ?1", CUSTOMIZATION_COLS),
        params![id],
    )
}

pub fn get_customization_by_order(
    conn: &Connection,
    order_id: &str,
) -> Result<Option<Customization>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM customizations WHERE order_id = ?1",
            CUSTOMIZATION_COLS
        ),
        params![order_id],
    )
}

pub fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM customizations WHERE username = ?1)",
        params![username],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn list_customizations(
    conn: &Connection,
    filter: &CustomizationFilter,
) -> Result<(Vec<Customization>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .page(
            conn,
            "customizations",
            CUSTOMIZATION_COLS,
            "created_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

pub fn complete_customization(conn: &Connection, id: &str, generated_email: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE customizations SET status = ?1, generated_email = ?2, completed_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            CustomizationStatus::Completed.as_ref(),
            generated_email,
            now(),
            id,
            CustomizationStatus::Pending.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

// ============ Tickets ============

/// Create a ticket with its opening message.
pub fn create_ticket(conn: &mut Connection, input: &CreateTicket) -> Result<TicketWithMessages> {
    let tx = conn.transaction()?;
    let now = now();
    let id = gen_id();

    // References are short; retry on the rare collision
    let mut reference = generate_reference();
    let mut inserted = false;
    for _ in 0..5 {
        let result = tx.execute(
            "INSERT INTO tickets (id, reference, customer_email, customer_name, order_id, subject, category, priority, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                &id,
                &reference,
                &input.customer_email,
                &input.customer_name,
                &input.order_id,
                &input.subject,
                input.category.as_ref(),
                input.priority.as_ref(),
                TicketStatus::Open.as_ref(),
                now
            ],
        );
        match result {
            Ok(_) => {
                inserted = true;
                break;
            }
            Err(e) if is_unique_violation(&e) => reference = generate_reference(),
            Err(e) => return Err(e.into()),
        }
    }
    if !inserted {
        return Err(AppError::Internal("Could not allocate a ticket reference".into()));
    }

    let message = insert_ticket_message(&tx, &id, MessageAuthor::Customer, None, &input.message)?;
    tx.commit()?;

    Ok(TicketWithMessages {
        ticket: Ticket {
            id,
            reference,
            customer_email: input.customer_email.clone(),
            customer_name: input.customer_name.clone(),
            order_id: input.order_id.clone(),
            subject: input.subject.clone(),
            category: input.category,
            priority: input.priority,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        },
        messages: vec![message],
    })
}

pub fn insert_ticket_message(
    conn: &Connection,
    ticket_id: &str,
    author: MessageAuthor,
    author_id: Option<&str>,
    body: &str,
) -> Result<TicketMessage> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO ticket_messages (id, ticket_id, author, author_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, ticket_id, author.as_ref(), author_id, body, now],
    )?;
    Ok(TicketMessage {
        id,
        ticket_id: ticket_id.to_string(),
        author,
        author_id: author_id.map(String::from),
        body: body.to_string(),
        created_at: now,
    })
}

pub fn get_ticket(conn: &Connection, id: &str) -> Result<Option<Ticket>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLS),
        params![id],
    )
}

pub fn list_ticket_messages(conn: &Connection, ticket_id: &str) -> Result<Vec<TicketMessage>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM ticket_messages WHERE ticket_id = ?1 ORDER BY created_at, rowid",
            TICKET_MESSAGE_COLS
        ),
        params![ticket_id],
    )
}

pub fn list_tickets_for_email(conn: &Connection, email: &str) -> Result<Vec<Ticket>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM tickets WHERE customer_email = ?1 COLLATE NOCASE ORDER BY updated_at DESC",
            TICKET_COLS
        ),
        params![email],
    )
}

pub fn list_tickets(conn: &Connection, filter: &TicketFilter) -> Result<(Vec<Ticket>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .eq("priority", filter.priority.map(|p| p.as_ref().to_string()))
        .page(
            conn,
            "tickets",
            TICKET_COLS,
            "updated_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

/// Set status; stamps `resolved_at` when moving to resolved or closed.
pub fn set_ticket_status(conn: &Connection, id: &str, status: TicketStatus) -> Result<bool> {
    let resolved = matches!(status, TicketStatus::Resolved | TicketStatus::Closed);
    let affected = conn.execute(
        "UPDATE tickets
         SET status = ?1, updated_at = ?2,
             resolved_at = CASE WHEN ?3 THEN COALESCE(resolved_at, ?2) ELSE NULL END
         WHERE id = ?4",
        params![status.as_ref(), now(), resolved, id],
    )?;
    Ok(affected > 0)
}

// ============ Notifications ============

pub struct NewNotification<'a> {
    pub kind: NotificationKind,
    pub recipient: &'a str,
    pub subject: &'a str,
    pub text_body: &'a str,
    pub html_body: &'a str,
    pub reference_id: Option<&'a str>,
}

pub fn create_notification(conn: &Connection, input: &NewNotification<'_>) -> Result<Notification> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO notifications (id, kind, recipient, subject, text_body, html_body, reference_id, status, attempts, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
        params![
            &id,
            input.kind.as_ref(),
            input.recipient,
            input.subject,
            input.text_body,
            input.html_body,
            input.reference_id,
            NotificationStatus::Pending.as_ref(),
            now
        ],
    )?;
    Ok(Notification {
        id,
        kind: input.kind,
        recipient: input.recipient.to_string(),
        subject: input.subject.to_string(),
        text_body: input.text_body.to_string(),
        html_body: input.html_body.to_string(),
        reference_id: input.reference_id.map(String::from),
        status: NotificationStatus::Pending,
        attempts: 0,
        last_error: None,
        created_at: now,
        sent_at: None,
    })
}

/// Record the outcome of one delivery attempt.
pub fn record_notification_attempt(
    conn: &Connection,
    id: &str,
    status: NotificationStatus,
    error: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notifications
         SET status = ?1, last_error = ?2, attempts = attempts + 1,
             sent_at = CASE WHEN ?1 = 'sent' THEN ?3 ELSE sent_at END
         WHERE id = ?4",
        params![status.as_ref(), error, now(), id],
    )?;
    Ok(affected > 0)
}

pub fn get_notification(conn: &Connection, id: &str) -> Result<Option<Notification>> {
    query_one(
        conn,
        &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLS),
        params![id],
    )
}

pub fn list_notifications_for_reference(
    conn: &Connection,
    reference_id: &str,
) -> Result<Vec<Notification>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM notifications WHERE reference_id = ?1 ORDER BY created_at",
            NOTIFICATION_COLS
        ),
        params![reference_id],
    )
}

pub fn list_notifications(
    conn: &Connection,
    filter: &NotificationFilter,
) -> Result<(Vec<Notification>, i64)> {
    Filters::default()
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .page(
            conn,
            "notifications",
            NOTIFICATION_COLS,
            "created_at DESC",
            PaginationQuery::new(filter.limit, filter.offset),
        )
}

// ============ Admins ============

const API_KEY_PREFIX_LEN: usize = 12;

/// Generate an admin API key with the kd_ prefix.
pub fn generate_api_key() -> String {
    format!("kd_{}", Uuid::new_v4().simple())
}

pub fn create_admin(
    conn: &Connection,
    input: &CreateAdmin,
    created_by: Option<&str>,
) -> Result<(Admin, String)> {
    let id = gen_id();
    let now = now();
    let key = generate_api_key();
    let prefix = key[..API_KEY_PREFIX_LEN].to_string();
    let key_hash = hash_secret(&key);

    conn.execute(
        "INSERT INTO admins (id, email, name, role, api_key_prefix, api_key_hash, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &input.email,
            &input.name,
            input.role.as_ref(),
            &prefix,
            &key_hash,
            now,
            created_by
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Admin {} already exists", input.email))
        } else {
            e.into()
        }
    })?;

    Ok((
        Admin {
            id,
            email: input.email.clone(),
            name: input.name.clone(),
            role: input.role,
            api_key_prefix: prefix,
            api_key_hash: key_hash,
            created_at: now,
            created_by: created_by.map(String::from),
        },
        key,
    ))
}

/// Resolve an API key to its admin. Candidates are narrowed by prefix and the
/// hash compared in constant time.
pub fn get_admin_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Admin>> {
    use subtle::ConstantTimeEq;

    let Some(prefix) = api_key.get(..API_KEY_PREFIX_LEN) else {
        return Ok(None);
    };
    let hash = hash_secret(api_key);
    let candidates: Vec<Admin> = query_all(
        conn,
        &format!("SELECT {} FROM admins WHERE api_key_prefix = ?1", ADMIN_COLS),
        params![prefix],
    )?;
    Ok(candidates
        .into_iter()
        .find(|admin| bool::from(admin.api_key_hash.as_bytes().ct_eq(hash.as_bytes()))))
}

pub fn get_admin(conn: &Connection, id: &str) -> Result<Option<Admin>> {
    query_one(
        conn,
        &format!("SELECT {} FROM admins WHERE id = ?1", ADMIN_COLS),
        params![id],
    )
}

pub fn list_admins(conn: &Connection) -> Result<Vec<Admin>> {
    query_all(
        conn,
        &format!("SELECT {} FROM admins ORDER BY created_at", ADMIN_COLS),
        [],
    )
}

pub fn count_admins(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))
        .map_err(Into::into)
}

pub fn count_owners(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM admins WHERE role = ?1",
        params![AdminRole::Owner.as_ref()],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn delete_admin(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM admins WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor: &AuditActor,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    if !enabled {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, actor_email, action, resource_type, resource_id, details, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            gen_id(),
            now(),
            actor_type.as_ref(),
            &actor.actor_id,
            &actor.actor_email,
            action.as_ref(),
            resource_type,
            resource_id,
            details.map(|d| d.to_string()),
            &actor.ip_address,
            &actor.user_agent
        ],
    )?;
    Ok(())
}

pub fn query_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, i64)> {
    let mut filters = Filters::default()
        .eq("actor_type", query.actor_type.map(|a| a.as_ref().to_string()))
        .eq("actor_id", query.actor_id.clone())
        .eq("action", query.action.clone())
        .eq("resource_type", query.resource_type.clone())
        .eq("resource_id", query.resource_id.clone());
    if let Some(from) = query.from_timestamp {
        filters = filters.raw("timestamp >= ?", vec![from.into()]);
    }
    if let Some(to) = query.to_timestamp {
        filters = filters.raw("timestamp <= ?", vec![to.into()]);
    }
    filters.page(
        conn,
        "audit_logs",
        AUDIT_LOG_COLS,
        "timestamp DESC",
        PaginationQuery::new(query.limit, query.offset),
    )
}

/// Purge public (buyer) audit entries older than the retention window.
/// Admin and system entries are kept.
pub fn purge_old_public_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * 86400;
    conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1 AND actor_type = ?2",
        params![cutoff, ActorType::Public.as_ref()],
    )
    .map_err(Into::into)
}
