//! Core utilities, configuration, and the entitlement engine

pub mod config;
pub mod entitlement;
pub mod error;
pub mod logging;
pub mod premium;

// Re-exports for convenience
pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_entitlement_configuration};
