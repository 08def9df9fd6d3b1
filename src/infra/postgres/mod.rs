//! PostgreSQL implementations for the production promo engine
//!
//! Provides the code registry, spot allocator, redemption ledger and
//! profile store backed by a shared connection pool.

mod allocator;
mod code_registry;
mod ledger;
mod profiles;
mod rows;

pub use allocator::*;
pub use code_registry::*;
pub use ledger::*;
pub use profiles::*;
