use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::catalog::{FeatureType, PlanCatalog, PlanTier};
use super::models::{EntitlementDecision, FeatureUsage, Subscription, UsageCounter};

/// key: entitlement-errors -> request-path taxonomy
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("unknown feature type: {0}")]
    InvalidFeature(String),
    #[error("quota exceeded: {used}/{limit}")]
    QuotaExceeded { used: i64, limit: i64 },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;

/// key: entitlement-evaluator -> quota decisions and atomic increments
///
/// The only writer of usage counters on the request path. The catalog is
/// an immutable value handed in at construction.
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
    catalog: PlanCatalog,
}

impl EntitlementService {
    pub fn new(pool: PgPool, catalog: PlanCatalog) -> Self {
        Self { pool, catalog }
    }

    /// The stored subscription, or the free default when the user has none.
    pub async fn subscription_status(&self, user_id: Uuid) -> EntitlementResult<Subscription> {
        let row = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or_else(|| Subscription::free_default(user_id, Utc::now())))
    }

    async fn effective_tier(&self, user_id: Uuid) -> EntitlementResult<PlanTier> {
        Ok(self.subscription_status(user_id).await?.effective_tier())
    }

    async fn current_count(&self, user_id: Uuid, feature: FeatureType) -> EntitlementResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM usage_counters WHERE user_id = $1 AND feature_type = $2",
        )
        .bind(user_id)
        .bind(feature.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Side-effect-free per-feature usage view for a user.
    pub async fn usage_snapshot(&self, user_id: Uuid) -> EntitlementResult<Vec<FeatureUsage>> {
        let tier = self.effective_tier(user_id).await?;
        let counters = sqlx::query_as::<_, UsageCounter>(
            "SELECT * FROM usage_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let snapshot = FeatureType::ALL
            .iter()
            .map(|feature| {
                let used = counters
                    .iter()
                    .find(|c| c.feature_type == feature.as_str())
                    .map(|c| c.count)
                    .unwrap_or(0);
                FeatureUsage::new(*feature, used, self.catalog.limit_for(tier, *feature))
            })
            .collect();
        Ok(snapshot)
    }

    /// Whether one more unit of `feature` would be admitted. Does not
    /// reserve anything; racing callers settle in `try_increment`.
    pub async fn can_use(
        &self,
        user_id: Uuid,
        feature: FeatureType,
    ) -> EntitlementResult<EntitlementDecision> {
        let tier = self.effective_tier(user_id).await?;
        let limit = self.catalog.limit_for(tier, feature);
        let used = self.current_count(user_id, feature).await?;
        let unlimited = limit < 0;

        Ok(EntitlementDecision {
            can_use: unlimited || used < limit,
            used,
            limit,
            unlimited,
        })
    }

    /// Consumes one unit of quota and returns the new count.
    ///
    /// The read-check-increment is a single conditional upsert so that two
    /// concurrent calls with one unit of quota remaining produce exactly
    /// one success; the losing statement matches no row and leaves the
    /// counter untouched.
    pub async fn try_increment(&self, user_id: Uuid, feature: FeatureType) -> EntitlementResult<i64> {
        let tier = self.effective_tier(user_id).await?;
        let limit = self.catalog.limit_for(tier, feature);

        if limit == 0 {
            return Err(EntitlementError::QuotaExceeded { used: 0, limit: 0 });
        }

        let new_count: Option<i64> = if limit < 0 {
            sqlx::query_scalar(
                r#"
                INSERT INTO usage_counters (id, user_id, feature_type, count)
                VALUES ($1, $2, $3, 1)
                ON CONFLICT (user_id, feature_type)
                DO UPDATE SET
                    count = usage_counters.count + 1,
                    updated_at = NOW()
                RETURNING count
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(feature.as_str())
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                r#"
                INSERT INTO usage_counters (id, user_id, feature_type, count)
                VALUES ($1, $2, $3, 1)
                ON CONFLICT (user_id, feature_type)
                DO UPDATE SET
                    count = usage_counters.count + 1,
                    updated_at = NOW()
                WHERE usage_counters.count < $4
                RETURNING count
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(feature.as_str())
            .bind(limit)
            .fetch_optional(&self.pool)
            .await?
        };

        match new_count {
            Some(count) => Ok(count),
            None => {
                let used = self.current_count(user_id, feature).await?;
                Err(EntitlementError::QuotaExceeded { used, limit })
            }
        }
    }

    /// Zeroes every counter a user has. Used by the billing processor on
    /// payment success and by the administrative reset endpoint.
    pub async fn reset_user_usage(&self, user_id: Uuid) -> EntitlementResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE usage_counters
            SET count = 0, last_reset_at = NOW(), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
