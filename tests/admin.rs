//! Admin API: auth, catalog, stock, orders and housekeeping.

use std::thread;
use std::time::Duration;

use axum::http::StatusCode;
use rusqlite::TransactionBehavior;
use serde_json::json;

mod common;
use common::*;

use keydesk::error::AppError;
use keydesk::models::AdminRole;

#[tokio::test]
async fn test_admin_routes_require_a_valid_key() {
    let ctx = TestContext::new();

    let (status, body) = ctx.get("/admin/products", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = ctx.get("/admin/products", Some("kd_not_a_real_key")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx.get("/admin/admins", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_support_cannot_use_owner_routes() {
    let ctx = TestContext::new();
    let support = ctx.support();
    ctx.product("P", "Product P");

    let (status, _) = ctx.get("/admin/products", Some(&support)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ctx.get("/admin/admins", Some(&support)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = ctx
        .post("/admin/keys/purge", json!({ "fsn": "P" }), Some(&support))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.delete("/admin/products/P", Some(&support)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(queries::get_product(&ctx.conn(), "P").unwrap().is_some());
}

#[tokio::test]
async fn test_product_crud() {
    let ctx = TestContext::new();
    let owner = ctx.owner();

    let (status, body) = ctx
        .post(
            "/admin/products",
            json!({
                "fsn": " OFFICE2021 ",
                "title": "Office 2021",
                "image_url": "https://img.test/o21.png",
            }),
            Some(&owner),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["fsn"], "OFFICE2021");

    let (status, _) = ctx
        .post("/admin/products", json!({ "fsn": "OFFICE2021", "title": "Dup" }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post("/admin/products", json!({ "fsn": "X", "title": " " }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Explicit null clears, absent leaves alone
    let (status, body) = ctx
        .put(
            "/admin/products/OFFICE2021",
            json!({ "title": "Office 2021 Pro", "image_url": null, "download_url": "https://dl.test/o21" }),
            Some(&owner),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Office 2021 Pro");
    assert!(body["image_url"].is_null());
    assert_eq!(body["download_url"], "https://dl.test/o21");

    let (status, _) = ctx
        .put("/admin/products/MISSING", json!({ "title": "Nope" }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = ctx.get("/admin/products", Some(&owner)).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = ctx.delete("/admin/products/OFFICE2021", Some(&owner)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.get("/admin/products/OFFICE2021", Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_product_with_issued_keys_cannot_be_deleted() {
    let ctx = TestContext::new();
    let owner = ctx.owner();
    ctx.product("P", "Product P");
    ctx.keys("P", &["KEY-1", "KEY-2"]);

    let (status, _) = ctx
        .post("/admin/keys/redeem", json!({ "fsn": "P", "order_id": ORDER_A }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ctx.delete("/admin/products/P", Some(&owner)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("1 redeemed"));
    assert_eq!(queries::count_keys_for_fsn(&ctx.conn(), "P").unwrap(), 2);
}

#[test]
fn test_product_delete_waits_for_in_flight_redemption() {
    let ctx = TestContext::new();
    ctx.product("D", "Deletable");
    ctx.keys("D", &["D-1", "D-2"]);

    let mut claimer = ctx.conn();
    let tx = claimer
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();
    queries::claim_available_key(&tx, "D", ORDER_A, 1).unwrap().unwrap();

    let pool = ctx.pool.clone();
    let deleter = thread::spawn(move || {
        let mut conn = pool.get().unwrap();
        queries::delete_product(&mut conn, "D")
    });
    thread::sleep(Duration::from_millis(100));
    tx.commit().unwrap();

    let result = deleter.join().unwrap();
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(queries::get_product(&ctx.conn(), "D").unwrap().is_some());
    assert_eq!(queries::count_keys_for_fsn(&ctx.conn(), "D").unwrap(), 2);
}

#[test]
fn test_product_delete_reports_unused_keys_removed() {
    let ctx = TestContext::new();
    ctx.product("D", "Deletable");
    ctx.keys("D", &["D-1", "D-2"]);

    assert_eq!(queries::delete_product(&mut ctx.conn(), "D").unwrap(), 2);
    assert!(queries::get_product(&ctx.conn(), "D").unwrap().is_none());
    assert!(matches!(
        queries::delete_product(&mut ctx.conn(), "D"),
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_key_import_list_and_stats() {
    let ctx = TestContext::new();
    let support = ctx.support();
    ctx.product("P", "Product P");
    ctx.product("EMPTY", "Nothing in stock");

    let (status, report) = ctx
        .post(
            "/admin/products/P/keys",
            json!({ "keys": "KEY-1\nKEY-2\nKEY-3\nKEY-2\n" }),
            Some(&support),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["inserted"], 3);
    assert_eq!(report["failed"], 1);

    let (status, _) = ctx
        .post("/admin/products/NOPE/keys", json!({ "keys": "KEY-9" }), Some(&support))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.post("/admin/keys/redeem", json!({ "fsn": "P", "order_id": ORDER_A }), Some(&support))
        .await;

    let (_, page) = ctx.get("/admin/keys?fsn=P&redeemed=false", Some(&support)).await;
    assert_eq!(page["total"], 2);
    let (_, page) = ctx.get("/admin/keys?search=1234567", Some(&support)).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["order_id"], ORDER_A);
    let (_, page) = ctx.get("/admin/keys?limit=2&offset=2", Some(&support)).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (status, stats) = ctx.get("/admin/keys/stats", Some(&support)).await;
    assert_eq!(status, StatusCode::OK);
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 2);
    let empty = stats.iter().find(|s| s["fsn"] == "EMPTY").unwrap();
    assert_eq!(empty["total"], 0);
    let p = stats.iter().find(|s| s["fsn"] == "P").unwrap();
    assert_eq!(p["title"], "Product P");
    assert_eq!(p["available"], 2);
    assert_eq!(p["redeemed"], 1);
}

#[tokio::test]
async fn test_purge_and_delete_skip_redeemed_keys() {
    let ctx = TestContext::new();
    let owner = ctx.owner();
    ctx.product("P", "Product P");
    ctx.keys("P", &["KEY-1", "KEY-2", "KEY-3"]);

    let (_, redeemed) = ctx
        .post("/admin/keys/redeem", json!({ "fsn": "P", "order_id": ORDER_A }), Some(&owner))
        .await;
    let redeemed_id = redeemed["key_id"].as_str().unwrap().to_string();

    let (status, _) = ctx.delete(&format!("/admin/keys/{}", redeemed_id), Some(&owner)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = ctx.delete("/admin/keys/missing", Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .post("/admin/keys/purge", json!({ "ids": [], "fsn": null }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx
        .post("/admin/keys/purge", json!({ "ids": ["a"], "fsn": "P" }), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, page) = ctx.get("/admin/keys?redeemed=false", Some(&owner)).await;
    let unused_id = page["items"][0]["id"].as_str().unwrap().to_string();
    let (status, body) = ctx
        .post(
            "/admin/keys/purge",
            json!({ "ids": [unused_id, redeemed_id] }),
            Some(&owner),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (_, body) = ctx
        .post("/admin/keys/purge", json!({ "fsn": "P" }), Some(&owner))
        .await;
    assert_eq!(body["deleted"], 1);
    assert_eq!(queries::count_keys_for_fsn(&ctx.conn(), "P").unwrap(), 1);
    assert_eq!(queries::count_redeemed_keys_for_fsn(&ctx.conn(), "P").unwrap(), 1);
}

#[tokio::test]
async fn test_manual_redeem_and_lookup() {
    let ctx = TestContext::new();
    let support = ctx.support();
    ctx.product("P", "Product P");
    ctx.keys("P", &["KEY-1"]);

    let (status, _) = ctx.get("/admin/keys/order/40812345671234567", Some(&support)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Admin input may omit the dashes
    let (status, body) = ctx
        .post(
            "/admin/keys/redeem",
            json!({ "fsn": "P", "order_id": "40812345671234567" }),
            Some(&support),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], ORDER_A);
    assert_eq!(body["newly_redeemed"], true);

    let (status, again) = ctx
        .post("/admin/keys/redeem", json!({ "fsn": "P", "order_id": ORDER_A }), Some(&support))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["key_id"], body["key_id"]);
    assert_eq!(again["newly_redeemed"], false);

    let (status, _) = ctx
        .post("/admin/keys/redeem", json!({ "fsn": "P", "order_id": ORDER_B }), Some(&support))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, found) = ctx.get(&format!("/admin/keys/order/{}", ORDER_A), Some(&support)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["license_key"], "KEY-1");

    let (_, logs) = ctx
        .get("/admin/audit-logs?action=redeem_key", Some(&support))
        .await;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["items"][0]["actor_type"], "admin");
    assert_eq!(logs["items"][0]["actor_email"], "support@keydesk.test");
}

#[tokio::test]
async fn test_orders() {
    let ctx = TestContext::new();
    let support = ctx.support();

    let (status, body) = ctx
        .post(
            "/admin/orders",
            json!({
                "order_id": ORDER_A,
                "secret_code": "1234 5678 9012 3456",
                "fsn": "OFFICE365-PERSONAL",
                "fulfillment_type": "fba",
                "contact_phone": "+91 98765 43210",
            }),
            Some(&support),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["secret_code"], "1234567890123456");
    assert_eq!(body["quantity"], 1);
    assert_eq!(body["contact_phone"], "+919876543210");

    let (status, _) = ctx
        .post(
            "/admin/orders",
            json!({ "order_id": ORDER_A, "fulfillment_type": "mfn" }),
            Some(&support),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for bad in [
        json!({ "order_id": "408-123", "fulfillment_type": "mfn" }),
        json!({ "order_id": ORDER_B, "fulfillment_type": "mfn", "secret_code": "12" }),
        json!({ "order_id": ORDER_B, "fulfillment_type": "mfn", "quantity": 0 }),
        json!({ "order_id": ORDER_B, "fulfillment_type": "mfn", "contact_email": "x" }),
    ] {
        let (status, _) = ctx.post("/admin/orders", bad, Some(&support)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    ctx.order(ORDER_B, None, None);
    let (_, page) = ctx.get("/admin/orders?fulfillment_type=fba", Some(&support)).await;
    assert_eq!(page["total"], 1);

    let (status, detail) = ctx.get("/admin/orders/40812345671234567", Some(&support)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["order_id"], ORDER_A);
    assert!(detail["license_key"].is_null());
    assert!(detail["warranty"].is_null());
    assert_eq!(detail["appeals"], json!([]));

    let (status, _) = ctx.get(&format!("/admin/orders/{}", ORDER_C), Some(&support)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_management() {
    let ctx = TestContext::new();
    let owner = ctx.owner();

    let (status, created) = ctx
        .post(
            "/admin/admins",
            json!({ "email": " New@Keydesk.test ", "name": "New Support", "role": "support" }),
            Some(&owner),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["admin"]["email"], "new@keydesk.test");
    assert!(created["admin"].get("api_key_hash").is_none());
    let new_key = created["api_key"].as_str().unwrap().to_string();
    let new_id = created["admin"]["id"].as_str().unwrap().to_string();

    // The returned key works straight away
    let (status, _) = ctx.get("/admin/products", Some(&new_key)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, admins) = ctx.get("/admin/admins", Some(&owner)).await;
    assert_eq!(admins.as_array().unwrap().len(), 2);
    let owner_id = admins
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["role"] == "owner")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = ctx.delete(&format!("/admin/admins/{}", owner_id), Some(&owner)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let second_owner = ctx.admin("second@keydesk.test", AdminRole::Owner);
    let (status, _) = ctx
        .delete(&format!("/admin/admins/{}", owner_id), Some(&second_owner))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx.delete(&format!("/admin/admins/{}", new_id), Some(&second_owner)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.get("/admin/products", Some(&new_key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_support_cannot_delete_admins() {
    let ctx = TestContext::new();
    let owner = ctx.owner();
    let support = ctx.support();
    let (_, admins) = ctx.get("/admin/admins", Some(&owner)).await;
    let owner_id = admins
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["role"] == "owner")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = ctx.delete(&format!("/admin/admins/{}", owner_id), Some(&support)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.delete("/admin/admins/missing", Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(queries::count_owners(&ctx.conn()).unwrap(), 1);
}

#[tokio::test]
async fn test_notification_retry() {
    let ctx = TestContext::new();
    let support = ctx.support();
    ctx.product("P", "Product P");
    ctx.keys("P", &["KEY-1"]);
    ctx.order(ORDER_A, Some("P"), Some("buyer@example.com"));
    ctx.post("/activate/redeem", json!({ "code": ORDER_A }), None).await;

    let (status, page) = ctx.get("/admin/notifications?status=skipped", Some(&support)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    let id = page["items"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(page["items"][0]["kind"], "key_delivery");

    let (status, body) = ctx
        .post(&format!("/admin/notifications/{}/retry", id), json!({}), Some(&support))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["attempts"], 2);

    let (status, _) = ctx
        .post("/admin/notifications/missing/retry", json!({}), Some(&support))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = ctx
        .get("/admin/audit-logs?action=retry_notification", Some(&support))
        .await;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["items"][0]["resource_id"], id.as_str());
}

#[tokio::test]
async fn test_audit_log_pagination() {
    let ctx = TestContext::new();
    let owner = ctx.owner();
    for i in 0..5 {
        ctx.post(
            "/admin/products",
            json!({ "fsn": format!("P{}", i), "title": format!("Product {}", i) }),
            Some(&owner),
        )
        .await;
    }

    let (status, page) = ctx
        .get("/admin/audit-logs?action=create_product&limit=2&offset=0", Some(&owner))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (_, last) = ctx
        .get("/admin/audit-logs?action=create_product&limit=2&offset=4", Some(&owner))
        .await;
    assert_eq!(last["items"].as_array().unwrap().len(), 1);

    let (_, filtered) = ctx
        .get("/admin/audit-logs?resource_type=product&resource_id=P3", Some(&owner))
        .await;
    assert_eq!(filtered["total"], 1);
}
