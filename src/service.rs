//! Validate and Redeem orchestration
//!
//! [`RedemptionService`] ties the rule chain to the storage seams:
//!
//! ```text
//! validate: normalize → load code → rule chain → (ledger lookup)
//! redeem:   normalize → load code → load profile → rule chain
//!           → allocate (retry on conflict, under timeout)
//!           → project benefits (failure is a warning)
//! ```
//!
//! Validate never writes. Redeem's only shared write is the allocator's
//! atomic unit; the profile projection happens after commit and can fail
//! without undoing the claimed spot.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    check_eligibility, verify_dense, CountryCode, Eligibility, LedgerAudit, NewPromoCode,
    ProfileProjection, PromoCode, PromoCodeId, PromoCodeKey, Redemption, Rejection, UserId,
    UserProfile, UserType,
};
use crate::infra::{
    CodeRegistry, MemoryStore, ProfileStore, PromoError, RedemptionLedger, Result, Retry,
    RetryConfig, SpotAllocator,
};
use crate::metrics::{metric_names, timed, MetricsRegistry};

/// Default upper bound for one allocation, retries included.
pub const DEFAULT_ALLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Warning attached to a redemption whose benefits could not be written.
pub const PROJECTION_PENDING_WARNING: &str =
    "Your founding member spot is reserved, but your benefits could not be applied yet. \
     They will be applied shortly.";

/// Outcome of a successful redeem
#[derive(Debug, Clone, Serialize)]
pub struct RedeemReceipt {
    pub redemption: Redemption,
    /// Set when the spot was claimed but the profile write failed.
    pub warning: Option<String>,
}

impl RedeemReceipt {
    pub fn message(&self) -> String {
        self.redemption.welcome_message()
    }
}

/// Promo validation and redemption over pluggable stores
#[derive(Clone)]
pub struct RedemptionService {
    codes: Arc<dyn CodeRegistry>,
    allocator: Arc<dyn SpotAllocator>,
    ledger: Arc<dyn RedemptionLedger>,
    profiles: Arc<dyn ProfileStore>,
    metrics: Arc<MetricsRegistry>,
    retry: Retry,
    allocation_timeout: Duration,
}

impl RedemptionService {
    pub fn new(
        codes: Arc<dyn CodeRegistry>,
        allocator: Arc<dyn SpotAllocator>,
        ledger: Arc<dyn RedemptionLedger>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            codes,
            allocator,
            ledger,
            profiles,
            metrics: Arc::new(MetricsRegistry::new()),
            retry: Retry::new(RetryConfig::allocation()),
            allocation_timeout: DEFAULT_ALLOCATION_TIMEOUT,
        }
    }

    /// Service backed entirely by one [`MemoryStore`].
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Retry::new(config);
        self
    }

    pub fn with_allocation_timeout(mut self, timeout: Duration) -> Self {
        self.allocation_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Datastore liveness, used by readiness probes.
    pub async fn ping(&self) -> Result<()> {
        self.codes.ping().await
    }

    /// Run the rule chain without side effects.
    ///
    /// With a `user_id`, an eligible request is additionally checked
    /// against the ledger and reports `AlreadyRedeemed` if the user already
    /// holds a spot. The answer is advisory either way.
    #[instrument(skip(self, country), fields(code = %code, user_type = %user_type))]
    pub async fn validate(
        &self,
        code: &str,
        user_type: UserType,
        country: &CountryCode,
        user_id: Option<UserId>,
    ) -> Result<Eligibility> {
        self.metrics.inc_counter(metric_names::VALIDATIONS).await;

        let result = self.validate_inner(code, user_type, country, user_id).await;
        match &result {
            Ok(_) => {
                self.metrics
                    .inc_counter(metric_names::VALIDATIONS_ELIGIBLE)
                    .await
            }
            Err(err) => self.record_failure(err).await,
        }
        result
    }

    async fn validate_inner(
        &self,
        code: &str,
        user_type: UserType,
        country: &CountryCode,
        user_id: Option<UserId>,
    ) -> Result<Eligibility> {
        let key = PromoCodeKey::parse(code)?;
        let promo = self.codes.find_by_code(&key).await?;
        let checked = check_eligibility(promo.as_ref(), user_type, country, Utc::now());

        let eligibility = match checked {
            Err(Rejection::Exhausted) => {
                return Err(self.exhausted_or_held(promo, user_id).await)
            }
            other => other?,
        };

        if let Some(user_id) = user_id {
            if self.holds_spot(eligibility.promo_code_id, user_id).await? {
                return Err(Rejection::AlreadyRedeemed.into());
            }
        }

        Ok(eligibility)
    }

    async fn holds_spot(&self, promo_code_id: PromoCodeId, user_id: UserId) -> Result<bool> {
        Ok(self.ledger.find(promo_code_id, user_id).await?.is_some())
    }

    /// A user who already holds a spot hears `AlreadyRedeemed`, also once
    /// the code has filled up.
    async fn exhausted_or_held(
        &self,
        promo: Option<PromoCode>,
        user_id: Option<UserId>,
    ) -> PromoError {
        let (Some(promo), Some(user_id)) = (promo, user_id) else {
            return Rejection::Exhausted.into();
        };
        match self.holds_spot(promo.id, user_id).await {
            Ok(true) => Rejection::AlreadyRedeemed.into(),
            Ok(false) => Rejection::Exhausted.into(),
            Err(err) => err,
        }
    }

    /// Claim a founding spot for `user_id`.
    ///
    /// User type and country come from the user's stored profile, never
    /// from the caller.
    #[instrument(skip(self), fields(code = %code, user_id = %user_id))]
    pub async fn redeem(&self, code: &str, user_id: UserId) -> Result<RedeemReceipt> {
        self.metrics
            .inc_counter(metric_names::REDEMPTIONS_ATTEMPTED)
            .await;

        let result = timed(
            &self.metrics,
            metric_names::REDEEM_LATENCY,
            self.redeem_inner(code, user_id),
        )
        .await;

        match &result {
            Ok(receipt) => {
                self.metrics
                    .inc_counter(metric_names::REDEMPTIONS_SUCCEEDED)
                    .await;
                info!(
                    promo_code_id = %receipt.redemption.promo_code_id,
                    spot_number = receipt.redemption.spot_number,
                    partial = receipt.warning.is_some(),
                    "Promo code redeemed"
                );
            }
            Err(err) => self.record_failure(err).await,
        }
        result
    }

    async fn redeem_inner(&self, code: &str, user_id: UserId) -> Result<RedeemReceipt> {
        let key = PromoCodeKey::parse(code)?;

        // A missing code is reported before anything about the user.
        let Some(promo) = self.codes.find_by_code(&key).await? else {
            return Err(Rejection::NotFound.into());
        };

        let profile = self
            .profiles
            .load_profile(user_id)
            .await?
            .ok_or_else(|| PromoError::Validation(format!("unknown user {user_id}")))?;

        // Time-invariant rules are settled here; the allocator re-checks
        // the cap and the one-per-user rule under its lock.
        let checked =
            check_eligibility(Some(&promo), profile.user_type, &profile.country, Utc::now());
        let eligibility = match checked {
            Err(Rejection::Exhausted) => {
                return Err(self.exhausted_or_held(Some(promo), Some(user_id)).await)
            }
            other => other?,
        };

        let redemption = self.allocate(eligibility.promo_code_id, user_id).await?;
        let warning = self.project(&redemption).await;

        Ok(RedeemReceipt {
            redemption,
            warning,
        })
    }

    async fn allocate(
        &self,
        promo_code_id: PromoCodeId,
        user_id: UserId,
    ) -> Result<Redemption> {
        let attempt = self.retry.run_with_predicate(
            "allocate_spot",
            || self.allocator.allocate(promo_code_id, user_id),
            PromoError::is_retryable,
        );

        let outcome = match tokio::time::timeout(
            self.allocation_timeout,
            timed(&self.metrics, metric_names::ALLOCATE_LATENCY, attempt),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                self.metrics
                    .inc_counter(metric_names::ALLOCATION_TIMEOUTS)
                    .await;
                warn!(
                    promo_code_id = %promo_code_id,
                    user_id = %user_id,
                    timeout_ms = self.allocation_timeout.as_millis() as u64,
                    "Allocation timed out"
                );
                return Err(PromoError::DatastoreUnavailable(
                    "allocation timed out".to_string(),
                ));
            }
        };

        // Every attempt but a final non-conflict outcome was a conflict.
        let conflicts = match &outcome.result {
            Err(err) if err.is_retryable() => outcome.attempts,
            _ => outcome.attempts.saturating_sub(1),
        };
        if conflicts > 0 {
            self.metrics
                .add_counter(metric_names::ALLOCATION_CONFLICTS, u64::from(conflicts))
                .await;
            debug!(
                promo_code_id = %promo_code_id,
                attempts = outcome.attempts,
                elapsed_ms = outcome.total_duration.as_millis() as u64,
                "Allocation contended"
            );
        }

        match outcome.into_result() {
            Err(err) if err.is_retryable() => {
                self.metrics
                    .inc_counter(metric_names::ALLOCATION_RETRIES_EXHAUSTED)
                    .await;
                Err(err)
            }
            other => other,
        }
    }

    /// Write the redemption's benefits onto the profile. Failure is
    /// reported, never propagated.
    async fn project(&self, redemption: &Redemption) -> Option<String> {
        let projection = ProfileProjection::from_redemption(redemption);

        match self.profiles.apply_projection(&projection).await {
            Ok(()) => None,
            Err(err) => {
                self.metrics
                    .inc_counter(metric_names::PROJECTION_FAILURES)
                    .await;
                warn!(
                    user_id = %redemption.user_id,
                    promo_code_id = %redemption.promo_code_id,
                    spot_number = redemption.spot_number,
                    error = %err,
                    "Benefit projection failed; redemption stands"
                );
                Some(PROJECTION_PENDING_WARNING.to_string())
            }
        }
    }

    async fn record_failure(&self, err: &PromoError) {
        match err {
            PromoError::Rejected(rejection) => {
                self.metrics.record_rejection(rejection.reason()).await;
            }
            PromoError::DatastoreUnavailable(_) | PromoError::Database(_) => {
                self.metrics
                    .inc_counter(metric_names::DATASTORE_ERRORS)
                    .await;
            }
            _ => {}
        }
    }

    /// Register a new code.
    pub async fn create_code(&self, code: NewPromoCode) -> Result<PromoCode> {
        let created = self.codes.create(code).await?;
        info!(
            promo_code_id = %created.id,
            code = %created.code,
            max_redemptions = created.max_redemptions,
            "Promo code created"
        );
        Ok(created)
    }

    pub async fn list_codes(&self) -> Result<Vec<PromoCode>> {
        self.codes.list().await
    }

    /// Seed or replace a profile as the identity provider would.
    pub async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.profiles.upsert_profile(profile).await
    }

    /// Ledger entries for a code in spot order, read together with the
    /// code row so the counter matches the rows.
    pub async fn redemptions(&self, code: &str) -> Result<(PromoCode, Vec<Redemption>)> {
        let promo = self.require_code(code).await?;
        self.ledger
            .snapshot(promo.id)
            .await?
            .ok_or_else(|| Rejection::NotFound.into())
    }

    /// Check a code's ledger for gaps, duplicates and counter drift.
    pub async fn audit(&self, code: &str) -> Result<LedgerAudit> {
        let (promo, rows) = self.redemptions(code).await?;
        Ok(verify_dense(promo.id, &rows, promo.current_redemptions))
    }

    async fn require_code(&self, code: &str) -> Result<PromoCode> {
        let key = PromoCodeKey::parse(code)?;
        self.codes
            .find_by_code(&key)
            .await?
            .ok_or_else(|| Rejection::NotFound.into())
    }
}
