//! Founding Spots Library
//!
//! Promo code redemption engine that hands out a capped number of
//! "founding member" spots, numbered densely from 1, and applies each
//! code's benefit bundle to the redeeming user's profile.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (codes, redemptions, eligibility rules)
//! - [`infra`] - Storage seams and implementations (PostgreSQL, in-memory)
//! - [`service`] - Validate and Redeem orchestration
//! - [`metrics`] - Observability and metrics
//! - [`telemetry`] - Structured logging setup
//! - [`api`] - REST API routes

pub mod api;
pub mod domain;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod server;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    BenefitBundle, CountryCode, Eligibility, NewPromoCode, PromoCode, PromoCodeId, PromoCodeKey,
    Redemption, Rejection, UserId, UserProfile, UserType,
};

pub use infra::{
    CodeRegistry, MemoryStore, ProfileStore, PromoError, RedemptionLedger, Result, SpotAllocator,
};

pub use service::{RedeemReceipt, RedemptionService};
