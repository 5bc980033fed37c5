//! Office 365 username customization.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::*;

/// An Office 365 order with a registered warranty.
async fn eligible_order(ctx: &TestContext, order_id: &str) {
    ctx.order(order_id, Some("OFFICE365-PERSONAL"), None);
    let (status, _) = ctx
        .post(
            "/warranty",
            json!({
                "order_id": order_id,
                "seller_feedback_proof": "a.png",
                "product_review_proof": "b.png",
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_username_check() {
    let ctx = TestContext::new();
    eligible_order(&ctx, ORDER_A).await;

    let (status, body) = ctx
        .get("/customization/username?username=%20John.Doe%20", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "john.doe");
    assert_eq!(body["email"], "john.doe@ms365.test");
    assert_eq!(body["available"], true);
    assert!(body.get("reason").is_none());

    let (_, body) = ctx.get("/customization/username?username=ab", None).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Username must be at least 3 characters");

    ctx.post(
        "/customization",
        json!({ "order_id": ORDER_A, "username": "john.doe" }),
        None,
    )
    .await;
    let (_, body) = ctx.get("/customization/username?username=JOHN.DOE", None).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Username is already taken");
}

#[tokio::test]
async fn test_eligibility_reasons() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, Some("OFFICE2024WIN"), None);
    ctx.order(ORDER_B, Some("office365-family"), None);

    let (status, body) = ctx
        .get(&format!("/customization/eligibility/{}", ORDER_A), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eligible"], false);
    assert!(body["reason"].as_str().unwrap().contains("Office 365"));

    // Prefix match ignores case; warranty is still missing
    let (_, body) = ctx
        .get(&format!("/customization/eligibility/{}", ORDER_B), None)
        .await;
    assert_eq!(body["eligible"], false);
    assert!(body["reason"].as_str().unwrap().contains("warranty"));

    let (_, body) = ctx
        .get(&format!("/customization/eligibility/{}", ORDER_C), None)
        .await;
    assert_eq!(body["reason"], "Order not found");

    let (status, _) = ctx.get("/customization/eligibility/nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_once_per_order_and_unique_username() {
    let ctx = TestContext::new();
    eligible_order(&ctx, ORDER_A).await;
    eligible_order(&ctx, ORDER_B).await;

    let (status, body) = ctx
        .post(
            "/customization",
            json!({ "order_id": ORDER_A, "username": "Priya.S", "display_name": "Priya S" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "priya.s");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["email"], "priya.s@ms365.test");

    let (_, body) = ctx
        .get(&format!("/customization/eligibility/{}", ORDER_A), None)
        .await;
    assert_eq!(body["eligible"], false);
    assert_eq!(body["existing"]["username"], "priya.s");

    let (status, _) = ctx
        .post(
            "/customization",
            json!({ "order_id": ORDER_A, "username": "someone.else" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post(
            "/customization",
            json!({ "order_id": ORDER_B, "username": "PRIYA.S" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post(
            "/customization",
            json!({ "order_id": ORDER_B, "username": "1priya" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ineligible_order_is_bad_request() {
    let ctx = TestContext::new();
    ctx.order(ORDER_A, Some("OFFICE365-PERSONAL"), None);

    let (status, body) = ctx
        .post(
            "/customization",
            json!({ "order_id": ORDER_A, "username": "valid.name" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("warranty"));
}

#[tokio::test]
async fn test_admin_completes_with_default_mailbox() {
    let ctx = TestContext::new();
    eligible_order(&ctx, ORDER_A).await;
    eligible_order(&ctx, ORDER_B).await;
    let admin = ctx.support();

    let (_, first) = ctx
        .post("/customization", json!({ "order_id": ORDER_A, "username": "first" }), None)
        .await;
    let (_, second) = ctx
        .post("/customization", json!({ "order_id": ORDER_B, "username": "second" }), None)
        .await;

    let (status, body) = ctx
        .get("/admin/customizations?status=pending", Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) = ctx
        .post(
            &format!("/admin/customizations/{}/complete", first["id"].as_str().unwrap()),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["generated_email"], "first@ms365.test");
    assert!(body["completed_at"].is_i64());

    let (status, body) = ctx
        .post(
            &format!("/admin/customizations/{}/complete", second["id"].as_str().unwrap()),
            json!({ "generated_email": "Second.Custom@Tenant.test" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generated_email"], "second.custom@tenant.test");

    let (status, _) = ctx
        .post(
            &format!("/admin/customizations/{}/complete", first["id"].as_str().unwrap()),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post("/admin/customizations/missing/complete", json!({}), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
