//! Promo code definitions and the benefit bundle they grant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CountryCode, InvalidValue, PromoCodeId, PromoCodeKey, UserType};

/// Benefits granted to a founding member.
///
/// Fixed shape: every field is optional but no other keys exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitBundle {
    pub trial_days: Option<u32>,
    pub property_limit: Option<u32>,
    pub discount_percentage: Option<u8>,
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BenefitBundle {
    /// The stored description, or one derived from the bundle fields.
    pub fn describe(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }

        let mut parts = Vec::new();
        if let Some(days) = self.trial_days {
            parts.push(format!("{days}-day free trial"));
        }
        if let Some(limit) = self.property_limit {
            let noun = if limit == 1 { "listing" } else { "listings" };
            parts.push(format!("{limit} property {noun}"));
        }
        if let Some(pct) = self.discount_percentage.filter(|p| *p > 0) {
            parts.push(format!("{pct}% off"));
        }
        if let Some(tier) = &self.tier {
            parts.push(format!("{tier} tier"));
        }

        if parts.is_empty() {
            "Founding member benefits".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A capped promotional code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: PromoCodeId,
    pub code: PromoCodeKey,
    pub target_user_type: UserType,
    pub target_country: CountryCode,
    pub max_redemptions: u32,
    pub current_redemptions: u32,
    pub trial_days: Option<u32>,
    pub property_limit: Option<u32>,
    pub discount_percentage: Option<u8>,
    pub assigned_tier: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn benefits(&self) -> BenefitBundle {
        BenefitBundle {
            trial_days: self.trial_days,
            property_limit: self.property_limit,
            discount_percentage: self.discount_percentage,
            tier: self.assigned_tier.clone(),
            description: self.description.clone(),
        }
    }

    pub fn spots_remaining(&self) -> u32 {
        self.max_redemptions.saturating_sub(self.current_redemptions)
    }

    /// Spot number the next successful redemption would receive.
    pub fn next_spot_number(&self) -> u32 {
        self.current_redemptions + 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_redemptions >= self.max_redemptions
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

/// Input for registering a new code
#[derive(Debug, Clone)]
pub struct NewPromoCode {
    pub code: PromoCodeKey,
    pub target_user_type: UserType,
    pub target_country: CountryCode,
    pub max_redemptions: u32,
    pub benefits: BenefitBundle,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl NewPromoCode {
    pub fn new(
        code: PromoCodeKey,
        target_user_type: UserType,
        target_country: CountryCode,
        max_redemptions: u32,
    ) -> Self {
        Self {
            code,
            target_user_type,
            target_country,
            max_redemptions,
            benefits: BenefitBundle::default(),
            expires_at: None,
            is_active: true,
        }
    }

    pub fn with_benefits(mut self, benefits: BenefitBundle) -> Self {
        self.benefits = benefits;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Field checks every registry runs before storing a code.
    pub fn validate(&self) -> Result<(), InvalidValue> {
        if self.max_redemptions == 0 {
            return Err(InvalidValue::new(
                "max_redemptions",
                "max_redemptions must be positive",
            ));
        }
        if let Some(discount) = self.benefits.discount_percentage {
            if discount > 100 {
                return Err(InvalidValue::new(
                    "discount_percentage",
                    format!("discount_percentage must be between 0 and 100, got {discount}"),
                ));
            }
        }
        Ok(())
    }

    /// Materialize with a fresh id and a zero counter.
    pub fn into_promo_code(self, created_at: DateTime<Utc>) -> PromoCode {
        PromoCode {
            id: PromoCodeId::new(),
            code: self.code,
            target_user_type: self.target_user_type,
            target_country: self.target_country,
            max_redemptions: self.max_redemptions,
            current_redemptions: 0,
            trial_days: self.benefits.trial_days,
            property_limit: self.benefits.property_limit,
            discount_percentage: self.benefits.discount_percentage,
            assigned_tier: self.benefits.tier,
            description: self.benefits.description,
            expires_at: self.expires_at,
            is_active: self.is_active,
            created_at,
        }
    }
}
