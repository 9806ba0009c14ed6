//! Billing event processor.
//!
//! The only writer of subscription state. Handlers apply provider events
//! unconditionally (last-write-wins per field), which makes replaying a
//! duplicate delivery a no-op. Events carry no sequence number, so a
//! later-timestamped event delivered before an earlier one can leave the
//! stored state behind the provider's view until the next delivery; that
//! window is a known limitation and is not corrected here.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entitlements::{EntitlementError, EntitlementService, PlanTier};
use crate::identity::UserDirectory;

use super::events::{
    BillingEvent, CheckoutCompleted, PaymentFailed, PaymentSucceeded, PriceTable,
    SubscriptionChanged, SubscriptionDeleted,
};

/// key: billing-errors -> async event taxonomy
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("unresolved billing subject: {0}")]
    UnresolvedSubject(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("identity lookup failed: {0}")]
    Directory(#[from] anyhow::Error),
}

impl From<EntitlementError> for BillingError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Storage(err) => BillingError::Storage(err),
            // The usage surface only returns these on the request path;
            // resets never produce them.
            other => BillingError::UnresolvedSubject(other.to_string()),
        }
    }
}

/// What became of an event. `Dropped` covers unresolvable subjects, which
/// are reported but never retried; a storage failure surfaces as an error
/// instead so the provider's redelivery can retry the whole event.
#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
    Dropped,
}

/// key: billing-processor -> idempotent subscription transitions
#[derive(Clone)]
pub struct BillingEventProcessor {
    pool: PgPool,
    prices: PriceTable,
    entitlements: EntitlementService,
    directory: Arc<dyn UserDirectory>,
}

impl BillingEventProcessor {
    pub fn new(
        pool: PgPool,
        prices: PriceTable,
        entitlements: EntitlementService,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            pool,
            prices,
            entitlements,
            directory,
        }
    }

    /// Applies one event. Failures in one event never affect another;
    /// callers decide whether to surface storage errors to the provider.
    pub async fn process(&self, event: BillingEvent) -> Result<EventOutcome, BillingError> {
        let kind = event.kind().to_string();
        let result = match event {
            BillingEvent::CheckoutCompleted(checkout) => self.checkout_completed(checkout).await,
            BillingEvent::SubscriptionChanged(changed) => self.subscription_changed(changed).await,
            BillingEvent::SubscriptionDeleted(deleted) => self.subscription_deleted(deleted).await,
            BillingEvent::PaymentSucceeded(payment) => self.payment_succeeded(payment).await,
            BillingEvent::PaymentFailed(payment) => self.payment_failed(payment).await,
            BillingEvent::Ignored { kind } => {
                info!(event_kind = %kind, "ignoring unhandled billing event type");
                return Ok(EventOutcome::Ignored);
            }
        };

        match result {
            Ok(()) => {
                info!(event_kind = %kind, "billing event applied");
                Ok(EventOutcome::Applied)
            }
            Err(BillingError::UnresolvedSubject(subject)) => {
                warn!(event_kind = %kind, %subject, "dropping billing event for unknown subject");
                Ok(EventOutcome::Dropped)
            }
            Err(err) => Err(err),
        }
    }

    async fn checkout_completed(&self, checkout: CheckoutCompleted) -> Result<(), BillingError> {
        let email = checkout
            .customer_email
            .as_deref()
            .ok_or_else(|| BillingError::UnresolvedSubject("checkout without email".into()))?;

        let user_id = self
            .directory
            .user_id_for_email(email)
            .await?
            .ok_or_else(|| BillingError::UnresolvedSubject(format!("no user for {email}")))?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, billing_customer_ref, billing_subscription_ref,
                status, payment_status
            ) VALUES ($1, $2, $3, $4, 'active', 'pending')
            ON CONFLICT (user_id)
            DO UPDATE SET
                billing_customer_ref = EXCLUDED.billing_customer_ref,
                billing_subscription_ref = EXCLUDED.billing_subscription_ref,
                status = 'active',
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(checkout.customer.as_deref())
        .bind(checkout.subscription.as_deref())
        .execute(&self.pool)
        .await?;

        info!(%user_id, subscription_ref = ?checkout.subscription, "checkout completed");
        Ok(())
    }

    async fn subscription_changed(&self, changed: SubscriptionChanged) -> Result<(), BillingError> {
        let subscription_ref = changed
            .id
            .as_deref()
            .ok_or_else(|| BillingError::UnresolvedSubject("change without subscription ref".into()))?;

        let status = normalize_status(changed.status.as_deref());
        // Canceled subscriptions always sit on the free tier.
        let tier = if status == "canceled" {
            PlanTier::Free
        } else {
            self.prices.tier_for(changed.price.as_ref())
        };

        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions
            SET status = $2,
                plan_tier = $3,
                current_period_start = $4,
                current_period_end = $5,
                updated_at = NOW()
            WHERE billing_subscription_ref = $1
            RETURNING user_id
            "#,
        )
        .bind(subscription_ref)
        .bind(&status)
        .bind(tier.as_str())
        .bind(changed.period_start())
        .bind(changed.period_end())
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(());
        }

        // The ref is new to us; a change event can still create the row when
        // the customer ref points at a subscription we already track (the
        // checkout and change events race, either order has to work).
        let customer_ref = changed.customer.as_deref().ok_or_else(|| {
            BillingError::UnresolvedSubject(format!("unknown subscription {subscription_ref}"))
        })?;

        let adopted = sqlx::query(
            r#"
            UPDATE subscriptions
            SET billing_subscription_ref = $2,
                status = $3,
                plan_tier = $4,
                current_period_start = $5,
                current_period_end = $6,
                updated_at = NOW()
            WHERE billing_customer_ref = $1
            "#,
        )
        .bind(customer_ref)
        .bind(subscription_ref)
        .bind(&status)
        .bind(tier.as_str())
        .bind(changed.period_start())
        .bind(changed.period_end())
        .execute(&self.pool)
        .await?;

        if adopted.rows_affected() == 0 {
            return Err(BillingError::UnresolvedSubject(format!(
                "no subscription for customer {customer_ref}"
            )));
        }
        Ok(())
    }

    async fn subscription_deleted(&self, deleted: SubscriptionDeleted) -> Result<(), BillingError> {
        let subscription_ref = deleted
            .id
            .as_deref()
            .ok_or_else(|| BillingError::UnresolvedSubject("delete without subscription ref".into()))?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', plan_tier = 'free', updated_at = NOW()
            WHERE billing_subscription_ref = $1
            "#,
        )
        .bind(subscription_ref)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::UnresolvedSubject(format!(
                "unknown subscription {subscription_ref}"
            )));
        }
        Ok(())
    }

    async fn payment_succeeded(&self, payment: PaymentSucceeded) -> Result<(), BillingError> {
        let subscription_ref = payment
            .subscription
            .as_deref()
            .ok_or_else(|| BillingError::UnresolvedSubject("payment without subscription ref".into()))?;

        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions
            SET payment_status = 'active', last_payment_at = NOW(), updated_at = NOW()
            WHERE billing_subscription_ref = $1
            RETURNING user_id
            "#,
        )
        .bind(subscription_ref)
        .fetch_optional(&self.pool)
        .await?;

        let user_id = user_id.ok_or_else(|| {
            BillingError::UnresolvedSubject(format!("unknown subscription {subscription_ref}"))
        })?;

        // A new paid period starts fresh. An in-flight increment racing this
        // reset may land on either side; neither order violates an invariant.
        let counters_reset = self.entitlements.reset_user_usage(user_id).await?;
        info!(%user_id, counters_reset, "payment succeeded, usage counters reset");
        Ok(())
    }

    async fn payment_failed(&self, payment: PaymentFailed) -> Result<(), BillingError> {
        let subscription_ref = payment
            .subscription
            .as_deref()
            .ok_or_else(|| BillingError::UnresolvedSubject("payment without subscription ref".into()))?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET payment_status = 'failed', updated_at = NOW()
            WHERE billing_subscription_ref = $1
            "#,
        )
        .bind(subscription_ref)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::UnresolvedSubject(format!(
                "unknown subscription {subscription_ref}"
            )));
        }
        warn!(%subscription_ref, "payment failed");
        Ok(())
    }
}

/// Folds provider status strings into the stored status set.
fn normalize_status(status: Option<&str>) -> String {
    match status {
        Some("trialing") => "trialing",
        Some("past_due") | Some("unpaid") => "past_due",
        Some("canceled") | Some("cancelled") => "canceled",
        Some("active") | None => "active",
        Some(other) => {
            warn!(provider_status = %other, "unrecognized subscription status, treating as active");
            "active"
        }
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_fold_into_stored_set() {
        assert_eq!(normalize_status(Some("trialing")), "trialing");
        assert_eq!(normalize_status(Some("unpaid")), "past_due");
        assert_eq!(normalize_status(Some("cancelled")), "canceled");
        assert_eq!(normalize_status(Some("incomplete")), "active");
        assert_eq!(normalize_status(None), "active");
    }
}
