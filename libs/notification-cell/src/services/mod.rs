pub mod channel;
pub mod outbox;
pub mod worker;
