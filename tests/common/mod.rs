//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use keydesk::db::{AppState, DbPool, queries};
use keydesk::allocator::RetryPolicy;
use keydesk::config::{Config, EmailConfig};
use keydesk::db;
use keydesk::models::*;

pub const ORDER_A: &str = "408-1234567-1234567";
pub const ORDER_B: &str = "408-7654321-7654321";
pub const ORDER_C: &str = "171-0000001-0000002";

/// A file-backed database in a temp dir plus app state wired to it.
/// File-backed so that pooled connections share one database and real
/// write locks are exercised.
pub struct TestContext {
    _dir: TempDir,
    pub pool: DbPool,
    pub state: AppState,
}

pub fn email_disabled() -> EmailConfig {
    EmailConfig {
        enabled: false,
        resend_api_key: None,
        resend_api_url: "http://127.0.0.1:1/emails".to_string(),
        from_email: "Keydesk <noreply@keydesk.test>".to_string(),
        support_email: "support@keydesk.test".to_string(),
    }
}

/// Email enabled with a key, pointed at a port nothing listens on.
pub fn email_unreachable() -> EmailConfig {
    EmailConfig {
        enabled: true,
        resend_api_key: Some("re_test_key".to_string()),
        ..email_disabled()
    }
}

pub fn test_config(email: EmailConfig) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: String::new(),
        base_url: "http://localhost:3000".to_string(),
        bootstrap_admin_email: None,
        dev_mode: true,
        audit_log_enabled: true,
        audit_log_retention_days: 90,
        email,
        redeem_retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(5),
        },
        customization_domain: "ms365.test".to_string(),
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_email(email_disabled())
    }

    pub fn with_email(email: EmailConfig) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("keydesk-test.db");
        let pool = db::create_pool(path.to_str().expect("utf-8 temp path")).expect("create pool");
        {
            let conn = pool.get().unwrap();
            db::init_db(&conn).expect("init schema");
        }
        let state = AppState::from_config(&test_config(email), pool.clone());
        Self {
            _dir: dir,
            pool,
            state,
        }
    }

    pub fn conn(&self) -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        self.pool.get().unwrap()
    }

    /// Make every later insert into `audit_logs` fail.
    pub fn fail_audit_writes(&self) {
        self.conn()
            .execute_batch(
                "CREATE TRIGGER fail_audit_insert BEFORE INSERT ON audit_logs
                 BEGIN SELECT RAISE(ABORT, 'audit log unavailable'); END;",
            )
            .unwrap();
    }

    pub fn app(&self) -> Router {
        keydesk::handlers::app(self.state.clone())
    }

    pub fn product(&self, fsn: &str, title: &str) -> Product {
        queries::create_product(
            &self.conn(),
            &CreateProduct {
                fsn: fsn.to_string(),
                title: title.to_string(),
                download_url: Some(format!("https://downloads.test/{}", fsn.to_lowercase())),
                installation_doc: Some(fsn.to_lowercase()),
                image_url: None,
            },
        )
        .unwrap()
    }

    pub fn keys(&self, fsn: &str, keys: &[&str]) {
        let conn = self.conn();
        for key in keys {
            queries::insert_license_key(&conn, fsn, key).unwrap();
        }
    }

    pub fn order(&self, order_id: &str, fsn: Option<&str>, contact_email: Option<&str>) -> Order {
        self.order_with(CreateOrder {
            order_id: order_id.to_string(),
            secret_code: None,
            fsn: fsn.map(String::from),
            fulfillment_type: FulfillmentType::Mfn,
            quantity: 1,
            order_date: None,
            contact_email: contact_email.map(String::from),
            contact_phone: None,
        })
    }

    pub fn order_with(&self, input: CreateOrder) -> Order {
        let id = OrderId::parse(&input.order_id).unwrap();
        queries::create_order(&self.conn(), &id, &input).unwrap()
    }

    /// Create an admin and return its API key.
    pub fn admin(&self, email: &str, role: AdminRole) -> String {
        let (_, key) = queries::create_admin(
            &self.conn(),
            &CreateAdmin {
                email: email.to_string(),
                name: email.to_string(),
                role,
            },
            None,
        )
        .unwrap();
        key
    }

    pub fn owner(&self) -> String {
        self.admin("owner@keydesk.test", AdminRole::Owner)
    }

    pub fn support(&self) -> String {
        self.admin("support@keydesk.test", AdminRole::Support)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(self.app(), "GET", uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        send(self.app(), "POST", uri, Some(body), token).await
    }

    pub async fn put(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        send(self.app(), "PUT", uri, Some(body), token).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(self.app(), "DELETE", uri, None, token).await
    }
}

/// Drive one request through the router and decode the JSON body
/// (`Value::Null` for empty bodies).
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response should be JSON")
    };
    (status, json)
}
