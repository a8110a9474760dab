pub mod claim_sweeper;

pub use claim_sweeper::{start_claim_sweeper, sweep_once};
