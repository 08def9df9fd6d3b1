//! Ledger entries, profile projections and the ledger density audit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{CountryCode, PromoCodeId, SubscriptionStatus, UserId, UserType};

/// One claimed spot. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: uuid::Uuid,
    pub promo_code_id: PromoCodeId,
    pub user_id: UserId,
    pub spot_number: u32,
    pub trial_days_applied: Option<u32>,
    pub property_limit_applied: Option<u32>,
    pub discount_applied: Option<u8>,
    pub tier_applied: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Redemption {
    pub fn welcome_message(&self) -> String {
        format!("Welcome Founding Member #{}!", self.spot_number)
    }
}

/// Identity-provider view of a user plus the projected subscription state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub user_type: UserType,
    pub country: CountryCode,
    pub subscription_tier: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub property_limit: Option<u32>,
}

impl UserProfile {
    pub fn new(user_id: UserId, user_type: UserType, country: CountryCode) -> Self {
        Self {
            user_id,
            user_type,
            country,
            subscription_tier: None,
            subscription_status: SubscriptionStatus::Inactive,
            trial_expires_at: None,
            property_limit: None,
        }
    }

    /// Overlay a projection. Absent bundle fields leave the profile untouched.
    pub fn apply(&mut self, projection: &ProfileProjection) {
        if projection.trial_expires_at.is_some() {
            self.trial_expires_at = projection.trial_expires_at;
        }
        if projection.property_limit.is_some() {
            self.property_limit = projection.property_limit;
        }
        if projection.subscription_tier.is_some() {
            self.subscription_tier = projection.subscription_tier.clone();
        }
        self.subscription_status = projection.subscription_status;
    }
}

/// Profile write derived from a committed redemption.
///
/// The redemption row is the source of truth, so the projection can be
/// recomputed and re-applied at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProjection {
    pub user_id: UserId,
    pub promo_code_id: PromoCodeId,
    pub spot_number: u32,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub property_limit: Option<u32>,
    pub subscription_tier: Option<String>,
    pub subscription_status: SubscriptionStatus,
}

impl ProfileProjection {
    pub fn from_redemption(redemption: &Redemption) -> Self {
        Self {
            user_id: redemption.user_id,
            promo_code_id: redemption.promo_code_id,
            spot_number: redemption.spot_number,
            trial_expires_at: redemption
                .trial_days_applied
                .map(|days| redemption.created_at + Duration::days(i64::from(days))),
            property_limit: redemption.property_limit_applied,
            subscription_tier: redemption.tier_applied.clone(),
            subscription_status: SubscriptionStatus::Trial,
        }
    }
}

/// Result of checking a code's ledger against its counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub promo_code_id: PromoCodeId,
    pub redemptions: u32,
    pub counter: u32,
    pub missing_spots: Vec<u32>,
    pub duplicate_spots: Vec<u32>,
    pub duplicate_users: Vec<UserId>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.redemptions == self.counter
            && self.missing_spots.is_empty()
            && self.duplicate_spots.is_empty()
            && self.duplicate_users.is_empty()
    }
}

/// Check that the spots of one code are exactly `{1..n}` with one row per
/// user and that `n` matches the stored counter.
pub fn verify_dense(
    promo_code_id: PromoCodeId,
    redemptions: &[Redemption],
    counter: u32,
) -> LedgerAudit {
    let mut seen_spots = HashSet::new();
    let mut seen_users = HashSet::new();
    let mut duplicate_spots = Vec::new();
    let mut duplicate_users = Vec::new();

    for redemption in redemptions {
        if !seen_spots.insert(redemption.spot_number) {
            duplicate_spots.push(redemption.spot_number);
        }
        if !seen_users.insert(redemption.user_id) {
            duplicate_users.push(redemption.user_id);
        }
    }

    let n = redemptions.len() as u32;
    let missing_spots = (1..=n).filter(|s| !seen_spots.contains(s)).collect();
    duplicate_spots.sort_unstable();

    LedgerAudit {
        promo_code_id,
        redemptions: n,
        counter,
        missing_spots,
        duplicate_spots,
        duplicate_users,
    }
}
