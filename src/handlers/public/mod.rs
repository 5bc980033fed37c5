mod activate;
mod appeals;
mod customization;
mod replacements;
mod tickets;
mod warranty;

pub use activate::*;
pub use appeals::*;
pub use customization::*;
pub use replacements::*;
pub use tickets::*;
pub use warranty::*;

use axum::{Json, Router, routing::{get, post}};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/activate/verify", post(verify_code))
        .route("/activate/redeem", post(redeem_code))
        .route("/activate/contact", post(save_contact))
        .route("/activate/lookup/{order_id}", get(lookup_redemption))
        .route("/warranty", post(submit_warranty))
        .route("/warranty/{order_id}", get(get_warranty_status))
        .route("/warranty/{order_id}/resubmit", post(resubmit_warranty))
        .route("/appeals", post(submit_appeal))
        .route("/appeals/{order_id}", get(list_order_appeals))
        .route("/replacements", post(submit_replacement))
        .route("/replacements/{order_id}", get(get_replacement_status))
        .route("/customization/username", get(check_username))
        .route("/customization/eligibility/{order_id}", get(check_eligibility))
        .route("/customization", post(submit_customization))
        .route("/tickets", post(create_ticket).get(list_my_tickets))
        .route("/tickets/{id}", get(get_my_ticket))
        .route("/tickets/{id}/reply", post(reply_to_ticket))
}
