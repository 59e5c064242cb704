pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::gateway::{OrderRequest, PaymentGateway, RazorpayClient};
pub use services::verifier::{compute_signature, verify, PaymentVerifier};
