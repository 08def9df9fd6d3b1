//! PostgreSQL redemption ledger (read side)
//!
//! Rows are only ever inserted by [`super::PgSpotAllocator`]. Audits read
//! the code row and its ledger inside one `REPEATABLE READ` transaction so
//! a claim committing mid-read cannot show up as counter drift.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::domain::{PromoCode, PromoCodeId, Redemption, UserId};
use crate::infra::{PromoError, RedemptionLedger, Result};

use super::rows::{PromoCodeRow, RedemptionRow, PROMO_CODE_COLUMNS, REDEMPTION_COLUMNS};

/// PostgreSQL-based redemption ledger
#[derive(Clone)]
pub struct PgRedemptionLedger {
    pool: PgPool,
}

impl PgRedemptionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RedemptionLedger for PgRedemptionLedger {
    async fn find(
        &self,
        promo_code_id: PromoCodeId,
        user_id: UserId,
    ) -> Result<Option<Redemption>> {
        let sql = format!(
            "SELECT {REDEMPTION_COLUMNS} FROM promo_redemptions \
             WHERE promo_code_id = $1 AND user_id = $2"
        );
        let row: Option<RedemptionRow> = sqlx::query_as(&sql)
            .bind(promo_code_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(PromoError::from_db)?;

        row.map(Redemption::try_from).transpose()
    }

    async fn list_by_code(&self, promo_code_id: PromoCodeId) -> Result<Vec<Redemption>> {
        let sql = format!(
            "SELECT {REDEMPTION_COLUMNS} FROM promo_redemptions \
             WHERE promo_code_id = $1 ORDER BY spot_number ASC"
        );
        let rows: Vec<RedemptionRow> = sqlx::query_as(&sql)
            .bind(promo_code_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(PromoError::from_db)?;

        rows.into_iter().map(Redemption::try_from).collect()
    }

    async fn count(&self, promo_code_id: PromoCodeId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM promo_redemptions WHERE promo_code_id = $1")
                .bind(promo_code_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(PromoError::from_db)?;

        Ok(count as u64)
    }

    async fn snapshot(
        &self,
        promo_code_id: PromoCodeId,
    ) -> Result<Option<(PromoCode, Vec<Redemption>)>> {
        let mut tx = self.pool.begin().await.map_err(PromoError::from_db)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(PromoError::from_db)?;

        let sql = format!("SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE id = $1");
        let code: Option<PromoCodeRow> = sqlx::query_as(&sql)
            .bind(promo_code_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(PromoError::from_db)?;
        let Some(code) = code else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {REDEMPTION_COLUMNS} FROM promo_redemptions \
             WHERE promo_code_id = $1 ORDER BY spot_number ASC"
        );
        let rows: Vec<RedemptionRow> = sqlx::query_as(&sql)
            .bind(promo_code_id.0)
            .fetch_all(&mut *tx)
            .await
            .map_err(PromoError::from_db)?;

        tx.commit().await.map_err(PromoError::from_db)?;

        let code = PromoCode::try_from(code)?;
        let rows = rows
            .into_iter()
            .map(Redemption::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((code, rows)))
    }
}
