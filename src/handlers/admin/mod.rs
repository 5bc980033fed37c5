mod admins;
mod appeals;
mod audit_logs;
mod customizations;
mod keys;
mod notifications;
mod orders;
mod products;
mod replacements;
mod tickets;
mod warranty;

pub use admins::*;
pub use appeals::*;
pub use audit_logs::*;
pub use customizations::*;
pub use keys::*;
pub use notifications::*;
pub use orders::*;
pub use products::*;
pub use replacements::*;
pub use tickets::*;
pub use warranty::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::db::AppState;
use crate::middleware::{admin_auth, require_owner_role};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Admin management and destructive operations (owner only)
        .route("/admin/admins", post(create_admin).get(list_admins))
        .route("/admin/admins/{id}", delete(delete_admin))
        .route("/admin/keys/purge", post(purge_keys))
        .route("/admin/keys/{id}", delete(delete_key))
        .route("/admin/products/{fsn}", delete(delete_product))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_owner_role,
        ))
        .merge(
            Router::new()
                // Catalog and key pools
                .route("/admin/products", post(create_product).get(list_products))
                .route("/admin/products/{fsn}", get(get_product).put(update_product))
                .route("/admin/products/{fsn}/keys", post(import_keys))
                .route("/admin/keys", get(list_keys))
                .route("/admin/keys/stats", get(key_stats))
                .route("/admin/keys/redeem", post(redeem_for_order))
                .route("/admin/keys/order/{order_id}", get(lookup_key_by_order))
                // Orders
                .route("/admin/orders", post(create_order).get(list_orders))
                .route("/admin/orders/{order_id}", get(get_order))
                // Warranty
                .route("/admin/warranty", get(list_warranties))
                .route("/admin/warranty/{id}", get(get_warranty))
                .route("/admin/warranty/{id}/review", post(review_warranty))
                // Appeals
                .route("/admin/appeals", get(list_appeals).post(initiate_appeal))
                .route("/admin/appeals/stats", get(appeal_stats))
                .route("/admin/appeals/order/{order_id}", get(lookup_order_appeals))
                .route("/admin/appeals/{id}/review", post(review_appeal))
                // Key replacements
                .route("/admin/replacements", get(list_replacements))
                .route("/admin/replacements/stats", get(replacement_stats))
                .route("/admin/replacements/{id}", get(get_replacement))
                .route("/admin/replacements/{id}/review", post(review_replacement))
                // Username customization
                .route("/admin/customizations", get(list_customizations))
                .route(
                    "/admin/customizations/{id}/complete",
                    post(complete_customization),
                )
                // Support tickets
                .route("/admin/tickets", get(list_tickets))
                .route("/admin/tickets/{id}", get(get_ticket))
                .route("/admin/tickets/{id}/reply", post(reply_ticket))
                .route("/admin/tickets/{id}/status", put(update_ticket_status))
                // Outbox and audit trail
                .route("/admin/notifications", get(list_notifications))
                .route("/admin/notifications/{id}/retry", post(retry_notification))
                .route("/admin/audit-logs", get(query_audit_logs))
                .layer(middleware::from_fn_with_state(state.clone(), admin_auth)),
        )
}
