//! Eligibility rule chain.
//!
//! Pure and read-only: the caller supplies the code snapshot and the clock.
//! Rules run in a fixed order and the first failing rule decides the outcome:
//!
//! 1. code exists
//! 2. code is active
//! 3. code has not expired
//! 4. spots remain
//! 5. requesting user type matches the code's audience
//! 6. requesting country matches
//!
//! A passing result is advisory. Rules 4 and the one-per-user rule are
//! re-evaluated inside the allocator's atomic unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{BenefitBundle, CountryCode, PromoCode, PromoCodeId, UserType};

/// Business-rule rejection with a stable reason and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NotFound,
    Inactive,
    Expired,
    Exhausted,
    WrongUserType { audience: String },
    WrongCountry { country: CountryCode },
    AlreadyRedeemed,
}

impl Rejection {
    pub fn wrong_user_type(target: UserType) -> Self {
        Rejection::WrongUserType {
            audience: target.audience().to_string(),
        }
    }

    /// Machine-readable reason, stable across releases.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NotFound => "not_found",
            Rejection::Inactive => "inactive",
            Rejection::Expired => "expired",
            Rejection::Exhausted => "exhausted",
            Rejection::WrongUserType { .. } => "wrong_user_type",
            Rejection::WrongCountry { .. } => "wrong_country",
            Rejection::AlreadyRedeemed => "already_redeemed",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotFound => f.write_str("Invalid promo code"),
            Rejection::Inactive => f.write_str("This promo code is no longer active"),
            Rejection::Expired => f.write_str("This promo code has expired"),
            Rejection::Exhausted => {
                f.write_str("All founding member spots for this code have been claimed")
            }
            Rejection::WrongUserType { audience } => {
                write!(f, "This promo code is only available to {audience}")
            }
            Rejection::WrongCountry { country } => {
                write!(f, "This promo code is only available in {country}")
            }
            Rejection::AlreadyRedeemed => f.write_str("You have already redeemed this promo code"),
        }
    }
}

/// Snapshot returned when every rule passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub promo_code_id: PromoCodeId,
    pub spots_remaining: u32,
    /// Spot the caller would get if nobody else redeems first.
    pub spot_number: u32,
    pub max_spots: u32,
    pub benefits: BenefitBundle,
}

/// Run the rule chain against a code snapshot.
pub fn check_eligibility(
    code: Option<&PromoCode>,
    user_type: UserType,
    country: &CountryCode,
    now: DateTime<Utc>,
) -> Result<Eligibility, Rejection> {
    let code = code.ok_or(Rejection::NotFound)?;
    check_static_rules(code, now)?;

    if code.is_exhausted() {
        return Err(Rejection::Exhausted);
    }
    if code.target_user_type != user_type {
        return Err(Rejection::wrong_user_type(code.target_user_type));
    }
    if &code.target_country != country {
        return Err(Rejection::WrongCountry {
            country: code.target_country.clone(),
        });
    }

    Ok(Eligibility {
        promo_code_id: code.id,
        spots_remaining: code.spots_remaining(),
        spot_number: code.next_spot_number(),
        max_spots: code.max_redemptions,
        benefits: code.benefits(),
    })
}

/// Activity and expiry rules, shared with the allocator's locked re-check.
pub fn check_static_rules(code: &PromoCode, now: DateTime<Utc>) -> Result<(), Rejection> {
    if !code.is_active {
        return Err(Rejection::Inactive);
    }
    if code.is_expired_at(now) {
        return Err(Rejection::Expired);
    }
    Ok(())
}
