//! API layer for the founding spots engine
//!
//! REST endpoints for validating and redeeming promo codes, plus health,
//! readiness and metrics.

pub mod error;
pub mod handlers;
mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
pub use rest::*;
