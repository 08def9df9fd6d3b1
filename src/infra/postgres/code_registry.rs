//! PostgreSQL code registry
//!
//! Reads promo definitions and registers new ones. The redemption counter
//! is never written here.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::domain::{NewPromoCode, PromoCode, PromoCodeId, PromoCodeKey};
use crate::infra::{CodeRegistry, PromoError, Result};

use super::rows::{to_i32, PromoCodeRow, PROMO_CODE_COLUMNS};

/// PostgreSQL-backed code registry
#[derive(Clone)]
pub struct PgCodeRegistry {
    pool: PgPool,
}

impl PgCodeRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CodeRegistry for PgCodeRegistry {
    #[instrument(skip(self), fields(code = %code))]
    async fn find_by_code(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>> {
        let sql = format!("SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE code = $1");
        let row: Option<PromoCodeRow> = sqlx::query_as(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PromoError::from_db)?;

        row.map(PromoCode::try_from).transpose()
    }

    #[instrument(skip(self), fields(promo_code_id = %id))]
    async fn get(&self, id: PromoCodeId) -> Result<Option<PromoCode>> {
        let sql = format!("SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE id = $1");
        let row: Option<PromoCodeRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(PromoError::from_db)?;

        row.map(PromoCode::try_from).transpose()
    }

    #[instrument(skip(self, code), fields(code = %code.code))]
    async fn create(&self, code: NewPromoCode) -> Result<PromoCode> {
        code.validate()?;

        let promo = code.into_promo_code(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO promo_codes (
                id, code, target_user_type, target_country,
                max_redemptions, current_redemptions,
                trial_days, property_limit, discount_percentage, assigned_tier, description,
                expires_at, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(promo.id.0)
        .bind(promo.code.as_str())
        .bind(promo.target_user_type.as_str())
        .bind(promo.target_country.as_str())
        .bind(to_i32("max_redemptions", promo.max_redemptions)?)
        .bind(promo.trial_days.map(|v| to_i32("trial_days", v)).transpose()?)
        .bind(promo.property_limit.map(|v| to_i32("property_limit", v)).transpose()?)
        .bind(promo.discount_percentage.map(i16::from))
        .bind(&promo.assigned_tier)
        .bind(&promo.description)
        .bind(promo.expires_at)
        .bind(promo.is_active)
        .bind(promo.created_at)
        .execute(&self.pool)
        .await
        .map_err(PromoError::from_db)?;

        if result.rows_affected() == 0 {
            return Err(PromoError::Validation(format!(
                "promo code {} already exists",
                promo.code
            )));
        }

        tracing::info!(promo_code_id = %promo.id, "Promo code registered");
        Ok(promo)
    }

    async fn list(&self) -> Result<Vec<PromoCode>> {
        let sql = format!("SELECT {PROMO_CODE_COLUMNS} FROM promo_codes ORDER BY created_at DESC");
        let rows: Vec<PromoCodeRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(PromoError::from_db)?;

        rows.into_iter().map(PromoCode::try_from).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PromoError::from_db)?;
        Ok(())
    }
}
