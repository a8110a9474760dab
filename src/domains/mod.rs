pub mod redemptions;
