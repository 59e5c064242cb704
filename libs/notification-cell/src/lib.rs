pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::channel::{EdgeFunctionChannel, NotificationChannel};
pub use services::outbox::NotificationOutbox;
pub use services::worker::{DispatchHandle, OutboxWorker};
