use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{BookingState, BookingStore, MemoryBookingStore, SupabaseBookingStore};
use notification_cell::{EdgeFunctionChannel, NotificationOutbox, OutboxWorker, WorkerConfig};
use payment_cell::{PaymentVerifier, RazorpayClient};
use shared_config::AppConfig;

/// Builds the booking state and the outbox worker over one store.
fn wire_booking<S>(store: Arc<S>, config: &AppConfig) -> (Arc<BookingState>, Arc<OutboxWorker>)
where
    S: BookingStore + 'static,
{
    let outbox: Arc<dyn NotificationOutbox> = store.clone();
    let worker = Arc::new(OutboxWorker::new(
        WorkerConfig {
            poll_interval_seconds: config.booking.notification_poll_secs,
            ..WorkerConfig::default()
        },
        outbox,
        Arc::new(EdgeFunctionChannel::new(config)),
    ));

    let state = BookingState::new(
        store,
        Arc::new(RazorpayClient::new(config)),
        PaymentVerifier::from_config(config),
        worker.handle(),
        config.booking.clone(),
    );

    (Arc::new(state), worker)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MediQ booking API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    if !config.is_payment_configured() {
        error!("Payment gateway credentials missing - order creation and confirmation will fail");
    }

    let (booking, worker) = if config.is_configured() {
        wire_booking(Arc::new(SupabaseBookingStore::new(&config)), &config)
    } else {
        warn!("Supabase not configured - using in-memory booking store, data will not survive a restart");
        wire_booking(Arc::new(MemoryBookingStore::new()), &config)
    };

    info!(
        "Booking settings: currency {}, slot capacity {}, confirm timeout {}s",
        config.booking.currency, config.booking.slot_capacity_policy, config.booking.confirm_timeout_secs
    );

    let outbox_worker = worker.clone();
    tokio::spawn(async move { outbox_worker.run().await });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config, booking)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down outbox worker");
    worker.shutdown().await;

    Ok(())
}
