//! Trait definitions for the promo engine's storage seams

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    NewPromoCode, ProfileProjection, PromoCode, PromoCodeId, PromoCodeKey, Redemption, UserId,
    UserProfile,
};

use super::Result;

/// Code registry stores promo definitions and the live redemption counter.
///
/// The counter is read-only through this trait; only a [`SpotAllocator`]
/// advances it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    /// Look up a code by its normalized key
    async fn find_by_code(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>>;

    /// Look up a code by id
    async fn get(&self, id: PromoCodeId) -> Result<Option<PromoCode>>;

    /// Register a new code with a zero counter
    async fn create(&self, code: NewPromoCode) -> Result<PromoCode>;

    /// List all codes, newest first
    async fn list(&self) -> Result<Vec<PromoCode>>;

    /// Round-trip to the datastore
    async fn ping(&self) -> Result<()>;
}

/// Spot allocator admits a user into the ledger with the next spot number.
///
/// Implementations run the one-per-user check, the cap check, the ledger
/// insert and the counter increment as one atomic unit.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpotAllocator: Send + Sync {
    /// Claim the next spot for `user_id`
    ///
    /// - `Rejected(AlreadyRedeemed)` if the user already holds a spot
    /// - `Rejected(Exhausted)` if no spots remain
    /// - `AllocationConflict` on transient contention (safe to retry)
    async fn allocate(&self, promo_code_id: PromoCodeId, user_id: UserId) -> Result<Redemption>;
}

/// Append-only redemption ledger.
///
/// Inserts happen only inside [`SpotAllocator::allocate`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RedemptionLedger: Send + Sync {
    /// Find the redemption a user holds for a code
    async fn find(&self, promo_code_id: PromoCodeId, user_id: UserId)
        -> Result<Option<Redemption>>;

    /// All redemptions for a code ordered by spot number
    async fn list_by_code(&self, promo_code_id: PromoCodeId) -> Result<Vec<Redemption>>;

    /// Number of redemptions for a code
    async fn count(&self, promo_code_id: PromoCodeId) -> Result<u64>;

    /// The code row and its redemptions (in spot order) read from one
    /// consistent snapshot, so the counter and the rows agree
    async fn snapshot(
        &self,
        promo_code_id: PromoCodeId,
    ) -> Result<Option<(PromoCode, Vec<Redemption>)>>;
}

/// External user profile: identity lookup and benefit projection target.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load a user's profile from the identity provider
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    /// Create or replace a profile (identity sync)
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Write a redemption's benefits onto the profile
    async fn apply_projection(&self, projection: &ProfileProjection) -> Result<()>;
}
