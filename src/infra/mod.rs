//! Infrastructure layer for the founding spots engine
//!
//! Contains trait definitions and implementations for:
//! - Code registry (promo code catalogue)
//! - Spot allocator (atomic, gap-free spot numbering)
//! - Redemption ledger (who holds which spot)
//! - Profile store (subscription projection target)
//! - Retry with backoff for allocation conflicts

mod error;
mod graceful_shutdown;
mod memory;
pub mod postgres;
mod retry;
mod traits;

pub use error::*;
pub use graceful_shutdown::{serve_until, serve_with_shutdown, shutdown_signal};
pub use memory::MemoryStore;
pub use postgres::{PgCodeRegistry, PgProfileStore, PgRedemptionLedger, PgSpotAllocator};
pub use retry::{Retry, RetryConfig, RetryResult};
pub use traits::*;
