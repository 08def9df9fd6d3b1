//! REST API handlers organized by domain.

pub mod health;
pub mod promo;

pub use health::*;
pub use promo::*;
