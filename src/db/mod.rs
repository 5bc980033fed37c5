pub mod from_row;
pub mod queries;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::allocator::RetryPolicy;
use crate::config::Config;
use crate::email::EmailService;
use crate::notify::Notifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub notifier: Notifier,
    pub audit_log_enabled: bool,
    pub base_url: String,
    pub redeem_retry: RetryPolicy,
    /// Mailbox domain for Office 365 username customizations
    pub customization_domain: String,
}

impl AppState {
    pub fn from_config(config: &Config, db: DbPool) -> Self {
        let notifier = Notifier::new(db.clone(), EmailService::new(&config.email));
        Self {
            db,
            notifier,
            audit_log_enabled: config.audit_log_enabled,
            base_url: config.base_url.clone(),
            redeem_retry: config.redeem_retry,
            customization_domain: config.customization_domain.clone(),
        }
    }
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a connection pool. Every connection gets WAL, foreign keys and a busy
/// timeout so concurrent writers queue inside SQLite instead of failing fast.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
    });
    Pool::builder().max_size(16).build(manager)
}

/// Create all tables and indexes. Safe to run on every start.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            fsn TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            download_url TEXT,
            installation_doc TEXT,
            image_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS license_keys (
            id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL UNIQUE,
            fsn TEXT NOT NULL,
            is_redeemed INTEGER NOT NULL DEFAULT 0,
            order_id TEXT,
            created_at INTEGER NOT NULL,
            redeemed_at INTEGER,
            replaced_at INTEGER,
            CHECK (is_redeemed = 0 OR order_id IS NOT NULL),
            CHECK (replaced_at IS NULL OR is_redeemed = 1)
        );
        CREATE INDEX IF NOT EXISTS idx_license_keys_available
            ON license_keys(fsn, is_redeemed);
        CREATE INDEX IF NOT EXISTS idx_license_keys_order ON license_keys(order_id);
        -- At most one live key per order per product line; replaced keys
        -- keep their order id
        CREATE UNIQUE INDEX IF NOT EXISTS idx_license_keys_fsn_order
            ON license_keys(fsn, order_id) WHERE order_id IS NOT NULL AND replaced_at IS NULL;

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE,
            secret_code TEXT UNIQUE,
            fsn TEXT,
            fulfillment_type TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            order_date INTEGER,
            contact_email TEXT,
            contact_phone TEXT,
            warranty_blocked INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_fsn ON orders(fsn);

        CREATE TABLE IF NOT EXISTS warranty_registrations (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            contact TEXT,
            customer_email TEXT,
            seller_feedback_proof TEXT,
            product_review_proof TEXT,
            missing_seller_feedback INTEGER NOT NULL DEFAULT 0,
            missing_product_review INTEGER NOT NULL DEFAULT 0,
            admin_notes TEXT,
            rejection_reason TEXT,
            reminder_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            verified_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_warranty_status ON warranty_registrations(status);

        CREATE TABLE IF NOT EXISTS appeals (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            proof TEXT,
            customer_phone TEXT,
            refund_preference TEXT NOT NULL DEFAULT 'none',
            refund_amount REAL,
            admin_notes TEXT,
            initiated_by_admin INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (order_id, kind)
        );
        CREATE INDEX IF NOT EXISTS idx_appeals_status ON appeals(status);

        CREATE TABLE IF NOT EXISTS replacement_requests (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            fsn TEXT NOT NULL,
            customer_email TEXT NOT NULL,
            proof TEXT NOT NULL,
            status TEXT NOT NULL,
            admin_notes TEXT,
            original_key_id TEXT NOT NULL,
            new_key_id TEXT,
            created_at INTEGER NOT NULL,
            reviewed_at INTEGER,
            reviewed_by TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_replacements_order ON replacement_requests(order_id);
        CREATE INDEX IF NOT EXISTS idx_replacements_status ON replacement_requests(status);
        -- One open request per order
        CREATE UNIQUE INDEX IF NOT EXISTS idx_replacements_pending
            ON replacement_requests(order_id) WHERE status = 'pending';

        CREATE TABLE IF NOT EXISTS customizations (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            status TEXT NOT NULL,
            generated_email TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            reference TEXT NOT NULL UNIQUE,
            customer_email TEXT NOT NULL,
            customer_name TEXT,
            order_id TEXT,
            subject TEXT NOT NULL,
            category TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_email ON tickets(customer_email);
        CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);

        CREATE TABLE IF NOT EXISTS ticket_messages (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
            author TEXT NOT NULL,
            author_id TEXT,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            text_body TEXT NOT NULL,
            html_body TEXT NOT NULL,
            reference_id TEXT,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            sent_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_status ON notifications(status);

        CREATE TABLE IF NOT EXISTS admins (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            api_key_prefix TEXT NOT NULL,
            api_key_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            created_by TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_admins_key_prefix ON admins(api_key_prefix);

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL,
            actor_id TEXT,
            actor_email TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )
}
