//! Raw table rows and their conversion into domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    CountryCode, PromoCode, PromoCodeId, PromoCodeKey, Redemption, SubscriptionStatus, UserId,
    UserProfile, UserType,
};
use crate::infra::{PromoError, Result};

pub(crate) const PROMO_CODE_COLUMNS: &str = r#"
    id, code, target_user_type, target_country,
    max_redemptions, current_redemptions,
    trial_days, property_limit, discount_percentage, assigned_tier, description,
    expires_at, is_active, created_at
"#;

pub(crate) const REDEMPTION_COLUMNS: &str = r#"
    id, promo_code_id, user_id, spot_number,
    trial_days_applied, property_limit_applied, discount_applied, tier_applied,
    created_at
"#;

/// Raw row from promo_codes
#[derive(Debug, FromRow)]
pub(crate) struct PromoCodeRow {
    pub id: Uuid,
    pub code: String,
    pub target_user_type: String,
    pub target_country: String,
    pub max_redemptions: i32,
    pub current_redemptions: i32,
    pub trial_days: Option<i32>,
    pub property_limit: Option<i32>,
    pub discount_percentage: Option<i16>,
    pub assigned_tier: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PromoCodeRow> for PromoCode {
    type Error = PromoError;

    fn try_from(row: PromoCodeRow) -> Result<Self> {
        Ok(PromoCode {
            id: PromoCodeId::from_uuid(row.id),
            code: PromoCodeKey::parse(&row.code).map_err(corrupt)?,
            target_user_type: row.target_user_type.parse::<UserType>().map_err(corrupt)?,
            target_country: CountryCode::parse(&row.target_country).map_err(corrupt)?,
            max_redemptions: non_negative("max_redemptions", row.max_redemptions)?,
            current_redemptions: non_negative("current_redemptions", row.current_redemptions)?,
            trial_days: row.trial_days.map(|v| non_negative("trial_days", v)).transpose()?,
            property_limit: row
                .property_limit
                .map(|v| non_negative("property_limit", v))
                .transpose()?,
            discount_percentage: row
                .discount_percentage
                .map(|v| percentage("discount_percentage", v))
                .transpose()?,
            assigned_tier: row.assigned_tier,
            description: row.description,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// Raw row from promo_redemptions
#[derive(Debug, FromRow)]
pub(crate) struct RedemptionRow {
    pub id: Uuid,
    pub promo_code_id: Uuid,
    pub user_id: Uuid,
    pub spot_number: i32,
    pub trial_days_applied: Option<i32>,
    pub property_limit_applied: Option<i32>,
    pub discount_applied: Option<i16>,
    pub tier_applied: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RedemptionRow> for Redemption {
    type Error = PromoError;

    fn try_from(row: RedemptionRow) -> Result<Self> {
        Ok(Redemption {
            id: row.id,
            promo_code_id: PromoCodeId::from_uuid(row.promo_code_id),
            user_id: UserId::from_uuid(row.user_id),
            spot_number: non_negative("spot_number", row.spot_number)?,
            trial_days_applied: row
                .trial_days_applied
                .map(|v| non_negative("trial_days_applied", v))
                .transpose()?,
            property_limit_applied: row
                .property_limit_applied
                .map(|v| non_negative("property_limit_applied", v))
                .transpose()?,
            discount_applied: row
                .discount_applied
                .map(|v| percentage("discount_applied", v))
                .transpose()?,
            tier_applied: row.tier_applied,
            created_at: row.created_at,
        })
    }
}

/// Raw row from user_profiles
#[derive(Debug, FromRow)]
pub(crate) struct UserProfileRow {
    pub user_id: Uuid,
    pub user_type: String,
    pub country: String,
    pub subscription_tier: Option<String>,
    pub subscription_status: String,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub property_limit: Option<i32>,
}

impl TryFrom<UserProfileRow> for UserProfile {
    type Error = PromoError;

    fn try_from(row: UserProfileRow) -> Result<Self> {
        Ok(UserProfile {
            user_id: UserId::from_uuid(row.user_id),
            user_type: row.user_type.parse::<UserType>().map_err(corrupt)?,
            country: CountryCode::parse(&row.country).map_err(corrupt)?,
            subscription_tier: row.subscription_tier,
            subscription_status: row
                .subscription_status
                .parse::<SubscriptionStatus>()
                .map_err(corrupt)?,
            trial_expires_at: row.trial_expires_at,
            property_limit: row
                .property_limit
                .map(|v| non_negative("property_limit", v))
                .transpose()?,
        })
    }
}

/// Bind helper: u32 domain counts are stored as INTEGER.
pub(crate) fn to_i32(field: &str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| PromoError::Validation(format!("{field} out of range")))
}

fn non_negative(field: &str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| PromoError::Internal(format!("negative {field} in datastore: {value}")))
}

fn percentage(field: &str, value: i16) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| PromoError::Internal(format!("invalid {field} in datastore: {value}")))
}

fn corrupt(err: crate::domain::InvalidValue) -> PromoError {
    PromoError::Internal(format!("invalid {} in datastore: {}", err.field, err.message))
}
