//! Domain entities shared across the application.

pub mod event;
pub mod session;
