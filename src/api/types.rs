//! Shared request and response types for REST API handlers.

use serde::{Deserialize, Serialize};

use crate::domain::{BenefitBundle, CountryCode, Eligibility, Rejection, UserId, UserType};
use crate::service::RedeemReceipt;

// ============================================================================
// Validate
// ============================================================================

/// Request body for `POST /api/v1/promo/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub user_type: UserType,
    pub country: CountryCode,
    /// When present, an already-redeemed user is reported as such.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Response for Validate. `valid:false` carries `error` and `reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spots_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_spots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefits: Option<BenefitBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidateResponse {
    pub fn eligible(eligibility: Eligibility) -> Self {
        Self {
            valid: true,
            spots_remaining: Some(eligibility.spots_remaining),
            spot_number: Some(eligibility.spot_number),
            max_spots: Some(eligibility.max_spots),
            benefits: Some(eligibility.benefits),
            error: None,
            reason: None,
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            valid: false,
            spots_remaining: None,
            spot_number: None,
            max_spots: None,
            benefits: None,
            error: Some(rejection.to_string()),
            reason: Some(rejection.reason().to_string()),
        }
    }
}

// ============================================================================
// Redeem
// ============================================================================

/// Request body for `POST /api/v1/promo/redeem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub user_id: UserId,
}

/// Response for Redeem. `success:false` carries `error` and `reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Spot claimed but benefits not yet applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RedeemResponse {
    pub fn redeemed(receipt: RedeemReceipt) -> Self {
        Self {
            success: true,
            spot_number: Some(receipt.redemption.spot_number),
            message: Some(receipt.message()),
            warning: receipt.warning,
            error: None,
            reason: None,
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            success: false,
            spot_number: None,
            message: None,
            warning: None,
            error: Some(rejection.to_string()),
            reason: Some(rejection.reason().to_string()),
        }
    }
}
