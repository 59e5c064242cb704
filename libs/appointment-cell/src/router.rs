// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::BookingState;

pub fn appointment_routes(state: Arc<BookingState>, config: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        // Booking: order creation and gateway confirmation
        .route("/orders", post(handlers::create_order))
        .route("/confirm", post(handlers::confirm_booking))

        // Appointment lifecycle
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/start", post(handlers::start_consultation))
        .route("/{appointment_id}/complete", post(handlers::complete_consultation))

        // Doctor dashboard polling and slot picker
        .route("/queue/{doctor_id}/{date}", get(handlers::get_doctor_queue))
        .route("/slots/{doctor_id}/{date}", get(handlers::get_slots))

        // Admin only
        .route("/admin/revenue", get(handlers::get_revenue_summary))
        .route("/admin/follow-ups", get(handlers::get_upcoming_follow_ups))
        .route("/admin/reconciliation", get(handlers::get_reconciliation_tickets))

        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
