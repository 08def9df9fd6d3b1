//! In-memory promo store
//!
//! Implements every storage trait over process memory. One mutex guards the
//! codes and the ledger together, so a claim's user check, cap check, insert
//! and counter bump happen under a single lock acquisition with no await
//! point in between. Used for local development (`STORE_BACKEND=memory`),
//! tests and benchmarks.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::{
    check_static_rules, NewPromoCode, ProfileProjection, PromoCode, PromoCodeId, PromoCodeKey,
    Redemption, Rejection, UserId, UserProfile,
};
use crate::infra::{
    CodeRegistry, ProfileStore, PromoError, RedemptionLedger, Result, SpotAllocator,
};

#[derive(Default)]
struct LedgerState {
    codes: HashMap<PromoCodeId, PromoCode>,
    by_key: HashMap<PromoCodeKey, PromoCodeId>,
    /// Per code, in spot order.
    redemptions: HashMap<PromoCodeId, Vec<Redemption>>,
}

/// Process-local implementation of the promo storage traits
#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<LedgerState>,
    profiles: RwLock<HashMap<UserId, UserProfile>>,
    fail_projections: AtomicBool,
    allocations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent profile projection writes fail (fault injection).
    pub fn fail_profile_projections(&self, fail: bool) {
        self.fail_projections.store(fail, Ordering::SeqCst);
    }

    /// Number of successful allocations since creation
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CodeRegistry for MemoryStore {
    async fn find_by_code(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>> {
        let state = self.ledger.lock().await;
        Ok(state
            .by_key
            .get(code)
            .and_then(|id| state.codes.get(id))
            .cloned())
    }

    async fn get(&self, id: PromoCodeId) -> Result<Option<PromoCode>> {
        Ok(self.ledger.lock().await.codes.get(&id).cloned())
    }

    async fn create(&self, code: NewPromoCode) -> Result<PromoCode> {
        code.validate()?;

        let mut state = self.ledger.lock().await;
        if state.by_key.contains_key(&code.code) {
            return Err(PromoError::Validation(format!(
                "promo code {} already exists",
                code.code
            )));
        }

        let promo = code.into_promo_code(Utc::now());
        state.by_key.insert(promo.code.clone(), promo.id);
        state.codes.insert(promo.id, promo.clone());
        Ok(promo)
    }

    async fn list(&self) -> Result<Vec<PromoCode>> {
        let state = self.ledger.lock().await;
        let mut codes: Vec<PromoCode> = state.codes.values().cloned().collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(codes)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SpotAllocator for MemoryStore {
    async fn allocate(&self, promo_code_id: PromoCodeId, user_id: UserId) -> Result<Redemption> {
        let mut guard = self.ledger.lock().await;
        let state = &mut *guard;

        let code = state
            .codes
            .get_mut(&promo_code_id)
            .ok_or(Rejection::NotFound)?;
        check_static_rules(code, Utc::now())?;

        let already = state
            .redemptions
            .get(&promo_code_id)
            .is_some_and(|rows| rows.iter().any(|r| r.user_id == user_id));
        if already {
            return Err(Rejection::AlreadyRedeemed.into());
        }

        if code.is_exhausted() {
            return Err(Rejection::Exhausted.into());
        }

        let benefits = code.benefits();
        let redemption = Redemption {
            id: Uuid::new_v4(),
            promo_code_id,
            user_id,
            spot_number: code.next_spot_number(),
            trial_days_applied: benefits.trial_days,
            property_limit_applied: benefits.property_limit,
            discount_applied: benefits.discount_percentage,
            tier_applied: benefits.tier,
            created_at: Utc::now(),
        };

        code.current_redemptions += 1;
        state
            .redemptions
            .entry(promo_code_id)
            .or_default()
            .push(redemption.clone());
        drop(guard);

        self.allocations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            promo_code_id = %promo_code_id,
            user_id = %user_id,
            spot_number = redemption.spot_number,
            "Spot allocated"
        );

        Ok(redemption)
    }
}

#[async_trait]
impl RedemptionLedger for MemoryStore {
    async fn find(
        &self,
        promo_code_id: PromoCodeId,
        user_id: UserId,
    ) -> Result<Option<Redemption>> {
        let state = self.ledger.lock().await;
        Ok(state
            .redemptions
            .get(&promo_code_id)
            .and_then(|rows| rows.iter().find(|r| r.user_id == user_id))
            .cloned())
    }

    async fn list_by_code(&self, promo_code_id: PromoCodeId) -> Result<Vec<Redemption>> {
        let state = self.ledger.lock().await;
        let mut rows = state
            .redemptions
            .get(&promo_code_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|r| r.spot_number);
        Ok(rows)
    }

    async fn count(&self, promo_code_id: PromoCodeId) -> Result<u64> {
        let state = self.ledger.lock().await;
        Ok(state
            .redemptions
            .get(&promo_code_id)
            .map_or(0, |rows| rows.len() as u64))
    }

    async fn snapshot(
        &self,
        promo_code_id: PromoCodeId,
    ) -> Result<Option<(PromoCode, Vec<Redemption>)>> {
        let state = self.ledger.lock().await;
        let Some(code) = state.codes.get(&promo_code_id).cloned() else {
            return Ok(None);
        };
        let mut rows = state
            .redemptions
            .get(&promo_code_id)
            .cloned()
            .unwrap_or_default();
        drop(state);

        rows.sort_by_key(|r| r.spot_number);
        Ok(Some((code, rows)))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn apply_projection(&self, projection: &ProfileProjection) -> Result<()> {
        if self.fail_projections.load(Ordering::SeqCst) {
            return Err(PromoError::ProfileProjection(
                "profile store rejected the write".to_string(),
            ));
        }

        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(&projection.user_id).ok_or_else(|| {
            PromoError::ProfileProjection(format!("no profile for user {}", projection.user_id))
        })?;
        profile.apply(projection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CountryCode, UserType};

    async fn seeded(max: u32) -> (MemoryStore, PromoCode) {
        let store = MemoryStore::new();
        let code = store
            .create(NewPromoCode::new(
                PromoCodeKey::parse("FOUND25").unwrap(),
                UserType::Agent,
                CountryCode::parse("GY").unwrap(),
                max,
            ))
            .await
            .unwrap();
        (store, code)
    }

    #[tokio::test]
    async fn test_sequential_spots() {
        let (store, code) = seeded(3).await;

        for expected in 1..=3 {
            let r = store.allocate(code.id, UserId::new()).await.unwrap();
            assert_eq!(r.spot_number, expected);
        }

        let err = store.allocate(code.id, UserId::new()).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Exhausted));
        assert_eq!(store.get(code.id).await.unwrap().unwrap().current_redemptions, 3);
        assert_eq!(store.count(code.id).await.unwrap(), 3);
        let spots: Vec<u32> = store
            .list_by_code(code.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.spot_number)
            .collect();
        assert_eq!(spots, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_already_redeemed_checked_before_cap() {
        let (store, code) = seeded(1).await;
        let user = UserId::new();

        store.allocate(code.id, user).await.unwrap();
        let err = store.allocate(code.id, user).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let (store, _) = seeded(1).await;
        let dup = NewPromoCode::new(
            PromoCodeKey::parse("found25").unwrap(),
            UserType::Agent,
            CountryCode::parse("GY").unwrap(),
            5,
        );
        assert!(matches!(store.create(dup).await, Err(PromoError::Validation(_))));
    }

    #[tokio::test]
    async fn test_projection_fault_injection() {
        let store = MemoryStore::new();
        let user = UserProfile::new(UserId::new(), UserType::Agent, CountryCode::parse("GY").unwrap());
        store.upsert_profile(&user).await.unwrap();

        let (_, code) = seeded(1).await;
        let redemption = Redemption {
            id: Uuid::new_v4(),
            promo_code_id: code.id,
            user_id: user.user_id,
            spot_number: 1,
            trial_days_applied: Some(30),
            property_limit_applied: None,
            discount_applied: None,
            tier_applied: None,
            created_at: Utc::now(),
        };
        let projection = ProfileProjection::from_redemption(&redemption);

        store.fail_profile_projections(true);
        assert!(store.apply_projection(&projection).await.is_err());

        store.fail_profile_projections(false);
        store.apply_projection(&projection).await.unwrap();
        let profile = store.load_profile(user.user_id).await.unwrap().unwrap();
        assert_eq!(profile.trial_expires_at, projection.trial_expires_at);
    }

    #[tokio::test]
    async fn test_discount_out_of_range_rejected() {
        let store = MemoryStore::new();
        let code = NewPromoCode::new(
            PromoCodeKey::parse("HALFOFF").unwrap(),
            UserType::Agent,
            CountryCode::parse("GY").unwrap(),
            5,
        )
        .with_benefits(crate::domain::BenefitBundle {
            discount_percentage: Some(150),
            ..Default::default()
        });

        let err = store.create(code).await.unwrap_err();
        assert!(matches!(err, PromoError::Validation(msg) if msg.contains("discount_percentage")));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_matches_counter() {
        let (store, code) = seeded(3).await;
        store.allocate(code.id, UserId::new()).await.unwrap();
        store.allocate(code.id, UserId::new()).await.unwrap();

        let (snapshot_code, rows) = store.snapshot(code.id).await.unwrap().unwrap();
        assert_eq!(snapshot_code.current_redemptions, 2);
        assert_eq!(
            rows.iter().map(|r| r.spot_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(store.snapshot(PromoCodeId::new()).await.unwrap().is_none());
    }
}
