//! Domain models for the founding-member promo engine
//!
//! Codes, ledger entries, profile projections and the eligibility rule chain.

mod eligibility;
mod promo;
mod redemption;
mod types;

pub use eligibility::*;
pub use promo::*;
pub use redemption::*;
pub use types::*;
