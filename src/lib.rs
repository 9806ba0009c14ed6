pub mod billing;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod identity;
pub mod routes;
pub mod webhooks;

pub use error::{AppError, AppResult};
