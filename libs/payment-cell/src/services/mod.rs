pub mod gateway;
pub mod verifier;
