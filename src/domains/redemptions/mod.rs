//! Deal redemption domain
//!
//! Claim issuance, QR presentation, counter scanning and the atomic
//! validation that turns a claim into exactly one redemption.

pub mod clock;
pub mod codes;
pub mod issuer;
pub mod limits;
pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod presentation;
pub mod scanner;
pub mod store;
pub mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use issuer::TokenIssuer;
pub use limits::{check_limits, day_window, LimitUsage};
pub use memory_store::{MemorySeed, MemoryStore};
pub use models::*;
pub use pg_store::PgStore;
pub use presentation::QrPresenter;
pub use scanner::{CounterScanner, ScanError, ScanEvent, ScanSession, ScanState};
pub use store::RedemptionStore;
pub use validator::Validator;
