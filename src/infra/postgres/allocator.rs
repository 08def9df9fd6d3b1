//! PostgreSQL spot allocator
//!
//! Assigns founding-member spots with dense, duplicate-free numbering.
//!
//! # Ordering Guarantees
//!
//! - **Gap-Free**: spots for a code are exactly `1..=current_redemptions`
//! - **Capped**: `current_redemptions` never exceeds `max_redemptions`
//! - **One per user**: `(promo_code_id, user_id)` is unique in the ledger
//!
//! # Atomicity
//!
//! Every claim runs in a single transaction that holds the code's row lock
//! from the cap check until commit:
//! ```sql
//! BEGIN;
//! SELECT ... FROM promo_codes WHERE id = $1 FOR UPDATE;
//! -- re-check user, re-check cap, spot = current + 1
//! INSERT INTO promo_redemptions ... ON CONFLICT (promo_code_id, user_id) DO NOTHING;
//! UPDATE promo_codes SET current_redemptions = current_redemptions + 1
//!     WHERE id = $1 AND current_redemptions = $2;
//! COMMIT;
//! ```
//!
//! Concurrent claimants for the same code queue on the row lock, so no two
//! of them can read the same counter value. The counter update is guarded by
//! the value read under the lock and the ledger's unique constraints back
//! both invariants even if the lock were bypassed. Dropping the transaction
//! before commit rolls everything back.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{check_static_rules, PromoCode, PromoCodeId, Redemption, Rejection, UserId};
use crate::infra::{PromoError, Result, SpotAllocator};

use super::rows::{to_i32, PromoCodeRow, PROMO_CODE_COLUMNS};

/// Default wait for the code row lock before reporting a conflict.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// PostgreSQL-based spot allocator
#[derive(Clone)]
pub struct PgSpotAllocator {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgSpotAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    async fn set_lock_timeout(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        // Transaction-scoped: reverts at commit/rollback.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut **tx)
            .await
            .map_err(PromoError::from_db)?;
        Ok(())
    }

    async fn lock_code(
        tx: &mut Transaction<'_, Postgres>,
        promo_code_id: PromoCodeId,
    ) -> Result<Option<PromoCode>> {
        let sql =
            format!("SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE id = $1 FOR UPDATE");
        let row: Option<PromoCodeRow> = sqlx::query_as(&sql)
            .bind(promo_code_id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(PromoError::from_db)?;

        row.map(PromoCode::try_from).transpose()
    }

    async fn redemption_exists_tx(
        tx: &mut Transaction<'_, Postgres>,
        promo_code_id: PromoCodeId,
        user_id: UserId,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM promo_redemptions
                WHERE promo_code_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(promo_code_id.0)
        .bind(user_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(PromoError::from_db)?;

        Ok(exists)
    }

    /// Insert unless the user already holds a spot. Returns false on a
    /// `(promo_code_id, user_id)` conflict.
    async fn insert_redemption_tx(
        tx: &mut Transaction<'_, Postgres>,
        redemption: &Redemption,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO promo_redemptions (
                id, promo_code_id, user_id, spot_number,
                trial_days_applied, property_limit_applied, discount_applied, tier_applied,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (promo_code_id, user_id) DO NOTHING
            "#,
        )
        .bind(redemption.id)
        .bind(redemption.promo_code_id.0)
        .bind(redemption.user_id.0)
        .bind(to_i32("spot_number", redemption.spot_number)?)
        .bind(
            redemption
                .trial_days_applied
                .map(|v| to_i32("trial_days_applied", v))
                .transpose()?,
        )
        .bind(
            redemption
                .property_limit_applied
                .map(|v| to_i32("property_limit_applied", v))
                .transpose()?,
        )
        .bind(redemption.discount_applied.map(i16::from))
        .bind(&redemption.tier_applied)
        .bind(redemption.created_at)
        .execute(&mut **tx)
        .await
        .map_err(PromoError::from_db)?;

        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-swap the counter from `expected` to `expected + 1`.
    async fn advance_counter_tx(
        tx: &mut Transaction<'_, Postgres>,
        promo_code_id: PromoCodeId,
        expected: u32,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET current_redemptions = current_redemptions + 1,
                updated_at = NOW()
            WHERE id = $1
              AND current_redemptions = $2
              AND current_redemptions < max_redemptions
            "#,
        )
        .bind(promo_code_id.0)
        .bind(to_i32("current_redemptions", expected)?)
        .execute(&mut **tx)
        .await
        .map_err(PromoError::from_db)?;

        if result.rows_affected() != 1 {
            return Err(PromoError::AllocationConflict(format!(
                "counter for {promo_code_id} moved from {expected} during allocation"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SpotAllocator for PgSpotAllocator {
    #[instrument(skip(self), fields(promo_code_id = %promo_code_id, user_id = %user_id))]
    async fn allocate(&self, promo_code_id: PromoCodeId, user_id: UserId) -> Result<Redemption> {
        let mut tx = self.pool.begin().await.map_err(PromoError::from_db)?;
        self.set_lock_timeout(&mut tx).await?;

        let code = Self::lock_code(&mut tx, promo_code_id)
            .await?
            .ok_or(Rejection::NotFound)?;

        // Cheap under the lock; keeps a code deactivated mid-flight closed.
        check_static_rules(&code, Utc::now())?;

        if Self::redemption_exists_tx(&mut tx, promo_code_id, user_id).await? {
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

        if !Self::insert_redemption_tx(&mut tx, &redemption).await? {
            return Err(Rejection::AlreadyRedeemed.into());
        }

        Self::advance_counter_tx(&mut tx, promo_code_id, code.current_redemptions).await?;

        tx.commit().await.map_err(PromoError::from_db)?;

        tracing::info!(
            promo_code_id = %promo_code_id,
            user_id = %user_id,
            spot_number = redemption.spot_number,
            "Spot allocated"
        );

        Ok(redemption)
    }
}
