//! Performance benchmarks for founding spot allocation.
//!
//! Run with: cargo bench

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use founding_spots::domain::{check_eligibility, verify_dense};
use founding_spots::infra::RetryConfig;
use founding_spots::{
    BenefitBundle, CountryCode, MemoryStore, NewPromoCode, PromoCodeKey, Redemption,
    RedemptionService, UserId, UserProfile, UserType,
};

fn gy() -> CountryCode {
    CountryCode::parse("GY").unwrap()
}

fn found25(max: u32) -> NewPromoCode {
    NewPromoCode::new(
        PromoCodeKey::parse("FOUND25").unwrap(),
        UserType::Agent,
        gy(),
        max,
    )
    .with_benefits(BenefitBundle {
        trial_days: Some(60),
        property_limit: Some(1),
        discount_percentage: None,
        tier: Some("basic".to_string()),
        description: None,
    })
}

/// Fresh service with one code and `users` registered agents
async fn seeded_service(max: u32, users: usize) -> (RedemptionService, Vec<UserId>) {
    let service = RedemptionService::from_memory(Arc::new(MemoryStore::new()))
        .with_retry(RetryConfig::fast());
    service.create_code(found25(max)).await.unwrap();

    let mut ids = Vec::with_capacity(users);
    for _ in 0..users {
        let user_id = UserId::new();
        service
            .upsert_profile(&UserProfile::new(user_id, UserType::Agent, gy()))
            .await
            .unwrap();
        ids.push(user_id);
    }
    (service, ids)
}

/// Benchmark the pure rule chain
fn bench_eligibility(c: &mut Criterion) {
    let promo = found25(25).into_promo_code(Utc::now());
    let country = gy();

    c.bench_function("check_eligibility", |b| {
        b.iter(|| {
            black_box(check_eligibility(
                Some(&promo),
                UserType::Agent,
                &country,
                Utc::now(),
            ))
        });
    });
}

/// Benchmark contended redemption: `spots + 50%` claimants race for `spots`
fn bench_contended_redeem(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("contended_redeem");

    for spots in [10u32, 100, 500].iter() {
        let claimants = *spots as usize * 3 / 2;
        group.throughput(Throughput::Elements(claimants as u64));
        group.bench_with_input(BenchmarkId::new("memory", spots), spots, |b, &spots| {
            b.to_async(&runtime).iter_custom(|iters| async move {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    let (service, users) = seeded_service(spots, claimants).await;

                    let start = Instant::now();
                    let handles: Vec<_> = users
                        .into_iter()
                        .map(|user_id| {
                            let service = service.clone();
                            tokio::spawn(async move { service.redeem("FOUND25", user_id).await })
                        })
                        .collect();
                    for handle in handles {
                        let _ = black_box(handle.await);
                    }
                    elapsed += start.elapsed();
                }
                elapsed
            });
        });
    }

    group.finish();
}

/// Benchmark the ledger density audit
fn bench_verify_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_dense");

    for count in [100u32, 1_000, 10_000].iter() {
        let promo = found25(*count).into_promo_code(Utc::now());
        let rows: Vec<Redemption> = (1..=*count)
            .map(|spot| Redemption {
                id: uuid::Uuid::new_v4(),
                promo_code_id: promo.id,
                user_id: UserId::new(),
                spot_number: spot,
                trial_days_applied: Some(60),
                property_limit_applied: Some(1),
                discount_applied: None,
                tier_applied: None,
                created_at: Utc::now(),
            })
            .collect();

        group.throughput(Throughput::Elements(u64::from(*count)));
        group.bench_with_input(BenchmarkId::new("audit", count), count, |b, &count| {
            b.iter(|| black_box(verify_dense(promo.id, &rows, count)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_eligibility,
    bench_contended_redeem,
    bench_verify_dense
);
criterion_main!(benches);
