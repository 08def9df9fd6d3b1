//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use founding_spots::infra::RetryConfig;
use founding_spots::{
    BenefitBundle, CountryCode, MemoryStore, NewPromoCode, PromoCode, PromoCodeKey,
    RedemptionService, UserId, UserProfile, UserType,
};

pub const FOUND25: &str = "FOUND25";

pub fn gy() -> CountryCode {
    CountryCode::parse("GY").unwrap()
}

pub fn us() -> CountryCode {
    CountryCode::parse("US").unwrap()
}

/// Founding agent code for Guyana with the usual launch bundle
pub fn found25(max_redemptions: u32) -> NewPromoCode {
    NewPromoCode::new(
        PromoCodeKey::parse(FOUND25).unwrap(),
        UserType::Agent,
        gy(),
        max_redemptions,
    )
    .with_benefits(BenefitBundle {
        trial_days: Some(60),
        property_limit: Some(1),
        discount_percentage: None,
        tier: Some("basic".to_string()),
        description: None,
    })
}

/// A code whose expiry is already behind us
pub fn expired_code(code: &str) -> NewPromoCode {
    NewPromoCode::new(
        PromoCodeKey::parse(code).unwrap(),
        UserType::Agent,
        gy(),
        10,
    )
    .with_expiry(Utc::now() - Duration::days(1))
}

/// Service over a fresh in-memory store, with short retry delays
pub fn memory_service() -> (Arc<MemoryStore>, RedemptionService) {
    let store = Arc::new(MemoryStore::new());
    let service =
        RedemptionService::from_memory(store.clone()).with_retry(RetryConfig::fast());
    (store, service)
}

pub async fn seed_code(service: &RedemptionService, code: NewPromoCode) -> PromoCode {
    service.create_code(code).await.unwrap()
}

/// Register a user with the given identity and return their id
pub async fn seed_user(
    service: &RedemptionService,
    user_type: UserType,
    country: CountryCode,
) -> UserId {
    let user_id = UserId::new();
    service
        .upsert_profile(&UserProfile::new(user_id, user_type, country))
        .await
        .unwrap();
    user_id
}

pub async fn seed_agents(service: &RedemptionService, count: usize) -> Vec<UserId> {
    let mut users = Vec::with_capacity(count);
    for _ in 0..count {
        users.push(seed_user(service, UserType::Agent, gy()).await);
    }
    users
}

/// Assert that a result is Ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a result is Err
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

/// Assert that a result is a specific business-rule rejection
#[macro_export]
macro_rules! assert_rejected {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err(founding_spots::PromoError::Rejected(rejection)) => {
                assert!(
                    matches!(rejection, $pattern),
                    "unexpected rejection: {rejection:?}"
                );
                rejection
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    };
}
