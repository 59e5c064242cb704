use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::BookingState;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, booking: Arc<BookingState>) -> Router {
    Router::new()
        .route("/", get(|| async { "MediQ booking API is running!" }))
        .nest("/appointments", appointment_routes(booking, config))
}
