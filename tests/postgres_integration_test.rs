//! Postgres-backed integration tests.
//!
//! These are ignored by default and are intended to run in CI (or locally)
//! with `DATABASE_URL` set.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use sqlx::postgres::PgPoolOptions;

use founding_spots::domain::{PromoCodeId, SubscriptionStatus};
use founding_spots::infra::{
    PgCodeRegistry, PgProfileStore, PgRedemptionLedger, PgSpotAllocator, RetryConfig,
};
use founding_spots::metrics::metric_names;
use founding_spots::{
    NewPromoCode, ProfileStore, PromoCodeKey, PromoError, RedemptionLedger, RedemptionService,
    Rejection, UserType,
};

use common::*;

async fn connect_db() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .ok()?;
    Some(pool)
}

fn pg_service(pool: sqlx::PgPool) -> RedemptionService {
    RedemptionService::new(
        Arc::new(PgCodeRegistry::new(pool.clone())),
        Arc::new(PgSpotAllocator::new(pool.clone())),
        Arc::new(PgRedemptionLedger::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool)),
    )
    .with_retry(RetryConfig::allocation().with_max_retries(10))
}

/// Hold the code's row lock from another transaction, as a slow claimant would.
async fn lock_code_row(
    pool: &sqlx::PgPool,
    promo_code_id: PromoCodeId,
) -> sqlx::Transaction<'static, sqlx::Postgres> {
    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM promo_codes WHERE id = $1 FOR UPDATE")
        .bind(promo_code_id.0)
        .execute(&mut *holder)
        .await
        .unwrap();
    holder
}

/// Codes are globally unique, so each test run uses a fresh one.
fn unique_code(prefix: &str, max: u32) -> (String, NewPromoCode) {
    let code = format!("{prefix}{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);
    let mut new_code = found25(max);
    new_code.code = PromoCodeKey::parse(&code).unwrap();
    (new_code.code.to_string(), new_code)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_concurrent_redeems_are_dense_and_capped() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let service = pg_service(pool);
    let max: u32 = 10;
    let extra: usize = 30;
    let (code, new_code) = unique_code("DENSE", max);
    seed_code(&service, new_code).await;
    let users = seed_agents(&service, max as usize + extra).await;

    let handles: Vec<_> = users
        .into_iter()
        .map(|user_id| {
            let service = service.clone();
            let code = code.clone();
            tokio::spawn(async move { service.redeem(&code, user_id).await })
        })
        .collect();

    let mut spots = BTreeSet::new();
    let mut exhausted = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                assert!(spots.insert(receipt.redemption.spot_number));
            }
            Err(PromoError::Rejected(Rejection::Exhausted)) => exhausted += 1,
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(spots, (1..=max).collect::<BTreeSet<_>>());
    assert_eq!(exhausted, extra);

    let audit = service.audit(&code).await.unwrap();
    assert!(audit.is_consistent(), "{audit:?}");
    assert_eq!(audit.counter, max);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_same_user_redeems_once() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let service = pg_service(pool);
    let (code, new_code) = unique_code("ONCE", 5);
    seed_code(&service, new_code).await;
    let user_id = seed_user(&service, UserType::Agent, gy()).await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let service = service.clone();
            let code = code.clone();
            tokio::spawn(async move { service.redeem(&code, user_id).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(PromoError::Rejected(Rejection::AlreadyRedeemed)) => {}
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(successes, 1);

    let (promo, rows) = service.redemptions(&code).await.unwrap();
    assert_eq!(promo.current_redemptions, 1);
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
#[ignore]
async fn postgres_redeem_projects_profile() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let profiles = PgProfileStore::new(pool.clone());
    let service = pg_service(pool);
    let (code, new_code) = unique_code("PROJ", 3);
    seed_code(&service, new_code).await;
    let user_id = seed_user(&service, UserType::Agent, gy()).await;

    let receipt = service.redeem(&code, user_id).await.unwrap();
    assert!(receipt.warning.is_none());

    let profile = profiles.load_profile(user_id).await.unwrap().unwrap();
    let trial_expires_at = profile.trial_expires_at.unwrap();
    let expected = receipt.redemption.created_at + Duration::days(60);
    assert!((trial_expires_at - expected).num_seconds().abs() <= 1);
    assert_eq!(profile.property_limit, Some(1));
    assert_eq!(profile.subscription_status, SubscriptionStatus::Trial);
}

#[tokio::test]
#[ignore]
async fn postgres_expired_and_inactive_codes_are_rejected() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let service = pg_service(pool);
    let user_id = seed_user(&service, UserType::Agent, gy()).await;

    let (late, _) = unique_code("LATE", 1);
    seed_code(&service, expired_code(&late)).await;
    let err = service.redeem(&late, user_id).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::Expired));

    let (paused, _) = unique_code("PAUSED", 1);
    seed_code(
        &service,
        NewPromoCode::new(PromoCodeKey::parse(&paused).unwrap(), UserType::Agent, gy(), 1)
            .inactive(),
    )
    .await;
    let err = service.redeem(&paused, user_id).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::Inactive));
}

#[tokio::test]
#[ignore]
async fn postgres_validate_does_not_write() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let service = pg_service(pool);
    let (code, new_code) = unique_code("READ", 4);
    seed_code(&service, new_code).await;

    for _ in 0..10 {
        let eligibility = service
            .validate(&code, UserType::Agent, &gy(), None)
            .await
            .unwrap();
        assert_eq!(eligibility.spots_remaining, 4);
    }

    let (promo, rows) = service.redemptions(&code).await.unwrap();
    assert_eq!(promo.current_redemptions, 0);
    assert!(rows.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_timed_out_redeem_leaves_no_partial_state() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    // The row lock outlasts the allocation budget but not the lock timeout.
    let service = pg_service(pool.clone()).with_allocation_timeout(StdDuration::from_millis(300));
    let (code, new_code) = unique_code("STALL", 3);
    let promo = seed_code(&service, new_code).await;
    let user_id = seed_user(&service, UserType::Agent, gy()).await;

    let holder = lock_code_row(&pool, promo.id).await;
    let err = service.redeem(&code, user_id).await.unwrap_err();
    assert!(
        matches!(&err, PromoError::DatastoreUnavailable(msg) if msg == "allocation timed out"),
        "{err:?}"
    );
    holder.rollback().await.unwrap();

    let ledger = PgRedemptionLedger::new(pool.clone());
    assert_eq!(ledger.count(promo.id).await.unwrap(), 0);
    let (after, rows) = service.redemptions(&code).await.unwrap();
    assert_eq!(after.current_redemptions, 0);
    assert!(rows.is_empty());

    let receipt = service.redeem(&code, user_id).await.unwrap();
    assert_eq!(receipt.redemption.spot_number, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_lock_timeout_is_retried_until_the_lock_frees() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    founding_spots::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let service = RedemptionService::new(
        Arc::new(PgCodeRegistry::new(pool.clone())),
        Arc::new(
            PgSpotAllocator::new(pool.clone()).with_lock_timeout(StdDuration::from_millis(50)),
        ),
        Arc::new(PgRedemptionLedger::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool.clone())),
    )
    .with_retry(RetryConfig::allocation().with_max_retries(20))
    .with_allocation_timeout(StdDuration::from_secs(10));

    let (code, new_code) = unique_code("WAIT", 3);
    let promo = seed_code(&service, new_code).await;
    let user_id = seed_user(&service, UserType::Agent, gy()).await;

    let holder = lock_code_row(&pool, promo.id).await;
    let pending = {
        let service = service.clone();
        let code = code.clone();
        tokio::spawn(async move { service.redeem(&code, user_id).await })
    };

    tokio::time::sleep(StdDuration::from_millis(400)).await;
    holder.rollback().await.unwrap();

    let receipt = pending.await.unwrap().unwrap();
    assert_eq!(receipt.redemption.spot_number, 1);
    assert!(
        service
            .metrics()
            .get_counter(metric_names::ALLOCATION_CONFLICTS)
            .await
            >= 1
    );

    let audit = service.audit(&code).await.unwrap();
    assert!(audit.is_consistent(), "{audit:?}");
    assert_eq!(audit.counter, 1);
}
