//! Feedback/review appeals and their effect on warranty.

use axum::http::StatusCode;
use serde_json::{Value, json};

mod common;
use common::*;

fn appeal(order_id: &str, kind: &str) -> Value {
    json!({
        "order_id": order_id,
        "kind": kind,
        "proof": "uploads/removed.png",
        "customer_phone": "9876543210",
    })
}

#[tokio::test]
async fn test_submit_and_reopen_after_rejection() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    let admin = ctx.support();

    let (status, body) = ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["customer_phone"], "+919876543210");
    assert_eq!(body["initiated_by_admin"], false);
    let id = body["id"].as_str().unwrap().to_string();

    // Already under review
    let (status, _) = ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The other kind is independent
    let (status, _) = ctx.post("/appeals", appeal(ORDER_A, "review"), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx
        .post(
            &format!("/admin/appeals/{}/review", id),
            json!({ "action": "reject", "admin_notes": "Feedback still visible" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let (status, body) = ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["status"], "pending");

    let (status, body) = ctx.get(&format!("/appeals/{}", ORDER_A), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_submit_validation() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);

    let mut partial = appeal(ORDER_A, "review");
    partial["refund_preference"] = json!("partial");
    let (status, _) = ctx.post("/appeals", partial.clone(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    partial["refund_amount"] = json!(250.0);
    let (status, body) = ctx.post("/appeals", partial, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["refund_amount"], 250.0);

    let mut bad_phone = appeal(ORDER_A, "feedback");
    bad_phone["customer_phone"] = json!("555-0100");
    let (status, _) = ctx.post("/appeals", bad_phone, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.post("/appeals", appeal("40812345671234567", "feedback"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.post("/appeals", appeal(ORDER_C, "feedback"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_initiated_appeal_blocks_warranty_until_approved() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    let admin = ctx.support();

    let (status, body) = ctx
        .post(
            "/admin/appeals",
            json!({ "order_id": ORDER_A, "kind": "review", "admin_notes": "1-star review" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["initiated_by_admin"], true);
    let id = body["id"].as_str().unwrap().to_string();
    assert!(queries::get_order(&ctx.conn(), ORDER_A).unwrap().unwrap().warranty_blocked);

    let warranty = json!({
        "order_id": ORDER_A,
        "seller_feedback_proof": "a.png",
        "product_review_proof": "b.png",
    });
    let (status, _) = ctx.post("/warranty", warranty.clone(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .post(
            &format!("/admin/appeals/{}/review", id),
            json!({ "action": "approve" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!queries::get_order(&ctx.conn(), ORDER_A).unwrap().unwrap().warranty_blocked);

    let (status, _) = ctx.post("/warranty", warranty, None).await;
    assert_eq!(status, StatusCode::CREATED);

    // Approved appeals are closed to both sides
    let (status, _) = ctx
        .post(
            &format!("/admin/appeals/{}/review", id),
            json!({ "action": "reject" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = ctx.post("/appeals", appeal(ORDER_A, "review"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_resubmit_decision_clears_proof() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    let admin = ctx.support();

    let (_, body) = ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .post(
            &format!("/admin/appeals/{}/review", id),
            json!({ "action": "resubmit", "admin_notes": "Screenshot cropped" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resubmit");
    assert!(body["proof"].is_null());
    assert_eq!(body["admin_notes"], "Screenshot cropped");

    let (status, body) = ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proof"], "uploads/removed.png");
}

#[tokio::test]
async fn test_stats_and_lookup() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    ctx.order(ORDER_B, None, None);
    let admin = ctx.support();

    ctx.post("/appeals", appeal(ORDER_A, "feedback"), None).await;
    ctx.post("/appeals", appeal(ORDER_A, "review"), None).await;
    let (_, body) = ctx.post("/appeals", appeal(ORDER_B, "review"), None).await;
    ctx.post(
        &format!("/admin/appeals/{}/review", body["id"].as_str().unwrap()),
        json!({ "action": "approve" }),
        Some(&admin),
    )
    .await;

    let (status, stats) = ctx.get("/admin/appeals/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["pending"], 2);
    assert_eq!(stats["approved"], 1);
    assert_eq!(stats["rejected"], 0);

    let (_, pending) = ctx.get("/admin/appeals?status=pending", Some(&admin)).await;
    assert_eq!(pending["total"], 2);

    // Admin lookup accepts the 17 digits without dashes
    let (status, body) = ctx
        .get("/admin/appeals/order/40812345671234567", Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["order_id"], ORDER_A);
    assert_eq!(body["appeals"].as_array().unwrap().len(), 2);

    let (status, _) = ctx.get("/admin/appeals/order/not-an-order", Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
