//! Warranty registration: customer submission and admin review.

use axum::http::StatusCode;
use serde_json::{Value, json};

mod common;
use common::*;

fn submission(order_id: &str) -> Value {
    json!({
        "order_id": order_id,
        "customer_email": "buyer@example.com",
        "seller_feedback_proof": "uploads/feedback.png",
        "product_review_proof": "uploads/review.png",
    })
}

async fn submit(ctx: &TestContext, order_id: &str) -> String {
    let (status, body) = ctx.post("/warranty", submission(order_id), None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["registration"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_submit_is_idempotent_per_order() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, Some("OFFICE2024WIN"), None);

    let (status, body) = ctx.post("/warranty", submission(ORDER_A), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    assert_eq!(body["registration"]["status"], "pending");

    let (status, again) = ctx.post("/warranty", submission(ORDER_A), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created"], false);
    assert_eq!(again["registration"]["id"], body["registration"]["id"]);

    let (status, current) = ctx.get(&format!("/warranty/{}", ORDER_A), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["status"], "pending");
}

#[tokio::test]
async fn test_submit_validation() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);

    let (status, _) = ctx.post("/warranty", submission("bad-id"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.post("/warranty", submission(ORDER_C), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut missing_proof = submission(ORDER_A);
    missing_proof["product_review_proof"] = json!("  ");
    let (status, _) = ctx.post("/warranty", missing_proof, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.get(&format!("/warranty/{}", ORDER_A), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blocked_order_cannot_register() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    queries::set_warranty_blocked(&ctx.conn(), ORDER_A, true).unwrap();

    let (status, body) = ctx.post("/warranty", submission(ORDER_A), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_resubmission_round_trip() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    let id = submit(&ctx, ORDER_A).await;
    let admin = ctx.support();

    // Customer cannot resubmit while pending
    let (status, _) = ctx
        .post(
            &format!("/warranty/{}/resubmit", ORDER_A),
            json!({ "seller_feedback_proof": "uploads/new.png" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Resubmission needs at least one missing proof
    let (status, _) = ctx
        .post(
            &format!("/admin/warranty/{}/review", id),
            json!({ "action": "request_resubmission" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx
        .post(
            &format!("/admin/warranty/{}/review", id),
            json!({
                "action": "request_resubmission",
                "missing_seller_feedback": true,
                "admin_notes": "Feedback screenshot is blurry",
            }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["status"], "needs_resubmission");
    assert_eq!(body["registration"]["missing_seller_feedback"], true);
    assert_eq!(body["registration"]["missing_product_review"], false);
    assert_eq!(body["email_status"], "skipped");

    // The flagged proof is required
    let (status, _) = ctx
        .post(
            &format!("/warranty/{}/resubmit", ORDER_A),
            json!({ "product_review_proof": "uploads/review2.png" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx
        .post(
            &format!("/warranty/{}/resubmit", ORDER_A),
            json!({ "seller_feedback_proof": "uploads/feedback2.png" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["seller_feedback_proof"], "uploads/feedback2.png");
    assert_eq!(body["product_review_proof"], "uploads/review.png");
    assert_eq!(body["missing_seller_feedback"], false);
}

#[tokio::test]
async fn test_approve_and_reject() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    ctx.order(ORDER_B, None, Some("order-contact@example.com"));
    let approved = submit(&ctx, ORDER_A).await;
    let (_, body) = ctx
        .post(
            "/warranty",
            json!({
                "order_id": ORDER_B,
                "seller_feedback_proof": "a.png",
                "product_review_proof": "b.png",
            }),
            None,
        )
        .await;
    let rejected = body["registration"]["id"].as_str().unwrap().to_string();
    let admin = ctx.support();

    let (status, body) = ctx
        .post(
            &format!("/admin/warranty/{}/review", approved),
            json!({ "action": "approve" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["status"], "verified");
    assert!(body["registration"]["verified_at"].is_i64());

    // Verified is final
    let (status, _) = ctx
        .post(
            &format!("/admin/warranty/{}/review", approved),
            json!({ "action": "reject" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx
        .post(
            &format!("/admin/warranty/{}/review", rejected),
            json!({ "action": "reject", "admin_notes": "Review not found on listing" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["status"], "rejected");
    assert_eq!(
        body["registration"]["rejection_reason"],
        "Review not found on listing"
    );
    // Falls back to the order's contact email
    let sent = queries::list_notifications_for_reference(&ctx.conn(), ORDER_B).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "order-contact@example.com");
}

#[tokio::test]
async fn test_review_survives_audit_failure() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, None, None);
    let id = submit(&ctx, ORDER_A).await;
    let admin = ctx.support();
    ctx.fail_audit_writes();

    let (status, body) = ctx
        .post(
            &format!("/admin/warranty/{}/review", id),
            json!({ "action": "approve" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["status"], "verified");
    assert_eq!(body["email_status"], "skipped");

    // The approval email is in the outbox and can be retried
    let sent = queries::list_notifications_for_reference(&ctx.conn(), ORDER_A).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "buyer@example.com");
    let (status, _) = ctx
        .post(&format!("/admin/notifications/{}/retry", sent[0].id), json!({}), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_list_and_detail() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, Some("OFFICE2024WIN"), None);
    ctx.order(ORDER_B, None, None);
    let id = submit(&ctx, ORDER_A).await;
    submit(&ctx, ORDER_B).await;
    let admin = ctx.support();

    let (status, body) = ctx.get("/admin/warranty?status=pending&limit=1", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, body) = ctx.get(&format!("/admin/warranty/{}", id), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], ORDER_A);
    assert_eq!(body["order"]["fsn"], "OFFICE2024WIN");
}
