//! Shared library for the dealdrop services
//!
//! Common pieces used by the consumer API and the counter service:
//! - Configuration loading
//! - Error type and its HTTP mapping
//! - Access token claims issued by the managed auth provider
//! - Role and plan types

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use auth::{AccessClaims, AuthService};
pub use config::{Config, EntitlementPolicy};
pub use error::{AppError, ErrorResponse, Result};
pub use types::*;
