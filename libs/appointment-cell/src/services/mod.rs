pub mod admin;
pub mod allocator;
pub mod booking;
pub mod lifecycle;
pub mod queue;
pub mod slots;
