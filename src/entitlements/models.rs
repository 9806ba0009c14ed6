use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::catalog::{FeatureType, PlanTier};

/// key: entitlement-models -> subscription row
///
/// One row per user at most; `status`/`plan_tier`/`payment_status` are
/// stored as text and parsed at the domain boundary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub status: String,
    pub plan_tier: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub payment_status: String,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Effective tier: canceled and free subscriptions always resolve to
    /// the free tier regardless of the stored `plan_tier`.
    pub fn effective_tier(&self) -> PlanTier {
        match self.status.as_str() {
            "free" | "canceled" => PlanTier::Free,
            _ => PlanTier::parse_or_free(&self.plan_tier),
        }
    }

    /// The default returned for users with no subscription row.
    pub fn free_default(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::nil(),
            user_id,
            billing_customer_ref: None,
            billing_subscription_ref: None,
            status: "free".to_string(),
            plan_tier: "free".to_string(),
            current_period_start: None,
            current_period_end: None,
            payment_status: "pending".to_string(),
            last_payment_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// key: entitlement-models -> usage counter row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageCounter {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feature_type: String,
    pub count: i64,
    pub last_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-feature view returned by the usage snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureUsage {
    pub feature: FeatureType,
    pub used: i64,
    pub limit: i64,
    pub unlimited: bool,
    pub percentage: u8,
}

impl FeatureUsage {
    pub fn new(feature: FeatureType, used: i64, limit: i64) -> Self {
        let unlimited = limit < 0;
        let percentage = if unlimited || limit == 0 {
            0
        } else {
            ((used * 100) / limit).clamp(0, 100) as u8
        };
        Self {
            feature,
            used,
            limit,
            unlimited,
            percentage,
        }
    }
}

/// Outcome of a non-mutating entitlement check.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementDecision {
    pub can_use: bool,
    pub used: i64,
    pub limit: i64,
    pub unlimited: bool,
}
