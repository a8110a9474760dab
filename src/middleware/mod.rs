pub mod auth;

pub use auth::{extract_context, require_staff};
