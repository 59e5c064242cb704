pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

pub use error::BookingError;
pub use models::*;
pub use router::appointment_routes;
pub use services::allocator::{AllocatorConfig, TokenAllocator};
pub use services::booking::BookingOrchestrator;
pub use state::BookingState;
pub use store::{BookingStore, FailPoint, MemoryBookingStore, StoreError, SupabaseBookingStore};
