//! PostgreSQL user profile store
//!
//! Holds the identity attributes Redeem needs (user type, country) and the
//! subscription state a redemption projects onto the user. Projection writes
//! run outside the allocation transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::domain::{ProfileProjection, UserId, UserProfile};
use crate::infra::{ProfileStore, PromoError, Result};

use super::rows::{to_i32, UserProfileRow};

/// PostgreSQL-based profile store
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row: Option<UserProfileRow> = sqlx::query_as(
            r#"
            SELECT user_id, user_type, country, subscription_tier, subscription_status,
                   trial_expires_at, property_limit
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(PromoError::from_db)?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (
                user_id, user_type, country, subscription_tier, subscription_status,
                trial_expires_at, property_limit, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                user_type = EXCLUDED.user_type,
                country = EXCLUDED.country,
                subscription_tier = EXCLUDED.subscription_tier,
                subscription_status = EXCLUDED.subscription_status,
                trial_expires_at = EXCLUDED.trial_expires_at,
                property_limit = EXCLUDED.property_limit,
                updated_at = NOW()
            "#,
        )
        .bind(profile.user_id.0)
        .bind(profile.user_type.as_str())
        .bind(profile.country.as_str())
        .bind(&profile.subscription_tier)
        .bind(profile.subscription_status.as_str())
        .bind(profile.trial_expires_at)
        .bind(
            profile
                .property_limit
                .map(|v| to_i32("property_limit", v))
                .transpose()?,
        )
        .execute(&self.pool)
        .await
        .map_err(PromoError::from_db)?;

        Ok(())
    }

    #[instrument(skip(self, projection), fields(user_id = %projection.user_id, spot_number = projection.spot_number))]
    async fn apply_projection(&self, projection: &ProfileProjection) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_profiles
            SET trial_expires_at = COALESCE($2, trial_expires_at),
                property_limit = COALESCE($3, property_limit),
                subscription_tier = COALESCE($4, subscription_tier),
                subscription_status = $5,
                founding_promo_code_id = $6,
                founding_spot_number = $7,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(projection.user_id.0)
        .bind(projection.trial_expires_at)
        .bind(
            projection
                .property_limit
                .map(|v| to_i32("property_limit", v))
                .transpose()?,
        )
        .bind(&projection.subscription_tier)
        .bind(projection.subscription_status.as_str())
        .bind(projection.promo_code_id.0)
        .bind(to_i32("spot_number", projection.spot_number)?)
        .execute(&self.pool)
        .await
        .map_err(PromoError::from_db)?;

        if result.rows_affected() == 0 {
            return Err(PromoError::ProfileProjection(format!(
                "no profile for user {}",
                projection.user_id
            )));
        }

        Ok(())
    }
}
