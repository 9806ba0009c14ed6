use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::entitlements::PlanTier;

/// key: billing-events -> provider payload model
///
/// Provider payloads are already signature-checked by the time they are
/// parsed here. Field presence is not trusted: anything the processor
/// needs is optional at this layer and validated when the event is
/// applied.
#[derive(Debug, Deserialize)]
pub struct BillingEventEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Value,
}

/// Tagged union of the event kinds the processor acts on. Unknown kinds
/// parse to `Ignored` for forward compatibility.
#[derive(Debug)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionChanged(SubscriptionChanged),
    SubscriptionDeleted(SubscriptionDeleted),
    PaymentSucceeded(PaymentSucceeded),
    PaymentFailed(PaymentFailed),
    Ignored { kind: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutCompleted {
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionChanged {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub price: Option<PriceRef>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionChanged {
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start.and_then(from_unix)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.and_then(from_unix)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionDeleted {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentSucceeded {
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentFailed {
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl BillingEventEnvelope {
    /// Folds the provider's event-type strings into the tagged union.
    pub fn into_event(self) -> BillingEvent {
        let object = self.data.object;
        match self.kind.as_str() {
            "checkout.session.completed" => {
                BillingEvent::CheckoutCompleted(from_object(object))
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                BillingEvent::SubscriptionChanged(from_object(object))
            }
            "customer.subscription.deleted" => {
                BillingEvent::SubscriptionDeleted(from_object(object))
            }
            "invoice.payment_succeeded" => BillingEvent::PaymentSucceeded(from_object(object)),
            "invoice.payment_failed" => BillingEvent::PaymentFailed(from_object(object)),
            _ => BillingEvent::Ignored { kind: self.kind },
        }
    }
}

impl BillingEvent {
    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted(_) => "checkout.session.completed",
            BillingEvent::SubscriptionChanged(_) => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted(_) => "customer.subscription.deleted",
            BillingEvent::PaymentSucceeded(_) => "invoice.payment_succeeded",
            BillingEvent::PaymentFailed(_) => "invoice.payment_failed",
            BillingEvent::Ignored { kind } => kind,
        }
    }
}

fn from_object<T: Default + serde::de::DeserializeOwned>(object: Value) -> T {
    serde_json::from_value(object).unwrap_or_default()
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// key: billing-price-table -> explicit price-to-tier mapping
///
/// Looked up by stable price id first, then by exact amount; anything
/// unmatched resolves to the free tier. Injected into the processor so
/// price changes are an operator concern, not a code change.
#[derive(Debug, Clone)]
pub struct PriceTable {
    price_ids: HashMap<String, PlanTier>,
    amounts: HashMap<i64, PlanTier>,
}

impl PriceTable {
    pub fn new(price_ids: HashMap<String, PlanTier>, amounts: HashMap<i64, PlanTier>) -> Self {
        Self { price_ids, amounts }
    }

    pub fn from_env() -> Self {
        #[derive(Deserialize)]
        struct Override {
            #[serde(default)]
            price_ids: HashMap<String, PlanTier>,
            #[serde(default)]
            amounts: HashMap<String, PlanTier>,
        }

        match crate::config::BILLING_PRICE_TABLE_JSON.as_deref() {
            Some(raw) => match serde_json::from_str::<Override>(raw) {
                Ok(parsed) => {
                    let amounts = parsed
                        .amounts
                        .into_iter()
                        .filter_map(|(k, v)| k.parse::<i64>().ok().map(|k| (k, v)))
                        .collect();
                    PriceTable::new(parsed.price_ids, amounts)
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        "BILLING_PRICE_TABLE_JSON is invalid; using built-in price table"
                    );
                    PriceTable::default()
                }
            },
            None => PriceTable::default(),
        }
    }

    pub fn tier_for(&self, price: Option<&PriceRef>) -> PlanTier {
        let Some(price) = price else {
            return PlanTier::Free;
        };
        if let Some(id) = price.id.as_deref() {
            if let Some(tier) = self.price_ids.get(id) {
                return *tier;
            }
        }
        if let Some(amount) = price.amount {
            if let Some(tier) = self.amounts.get(&amount) {
                return *tier;
            }
        }
        PlanTier::Free
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            price_ids: HashMap::new(),
            amounts: HashMap::from([(999, PlanTier::Pro), (2999, PlanTier::Premium)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_mapping_requires_exact_match() {
        let table = PriceTable::default();
        let tier = |amount| {
            table.tier_for(Some(&PriceRef {
                id: None,
                amount: Some(amount),
            }))
        };
        assert_eq!(tier(999), PlanTier::Pro);
        assert_eq!(tier(2999), PlanTier::Premium);
        assert_eq!(tier(1000), PlanTier::Free);
        assert_eq!(table.tier_for(None), PlanTier::Free);
    }

    #[test]
    fn price_id_wins_over_amount() {
        let table = PriceTable::new(
            HashMap::from([("price_premium".to_string(), PlanTier::Premium)]),
            HashMap::from([(999, PlanTier::Pro)]),
        );
        let tier = table.tier_for(Some(&PriceRef {
            id: Some("price_premium".to_string()),
            amount: Some(999),
        }));
        assert_eq!(tier, PlanTier::Premium);
    }

    #[test]
    fn unknown_event_types_parse_to_ignored() {
        let envelope: BillingEventEnvelope = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "customer.tax_id.created",
            "data": { "object": {} }
        }))
        .unwrap();
        match envelope.into_event() {
            BillingEvent::Ignored { kind } => assert_eq!(kind, "customer.tax_id.created"),
            other => panic!("expected ignored event, got {other:?}"),
        }
    }

    #[test]
    fn subscription_changed_parses_period_bounds() {
        let envelope: BillingEventEnvelope = serde_json::from_value(json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_42",
                "customer": "cus_42",
                "status": "active",
                "price": { "id": "price_pro", "amount": 999 },
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }}
        }))
        .unwrap();
        match envelope.into_event() {
            BillingEvent::SubscriptionChanged(changed) => {
                assert_eq!(changed.id.as_deref(), Some("sub_42"));
                assert_eq!(changed.status.as_deref(), Some("active"));
                assert!(changed.period_start().is_some());
                assert!(changed.period_end().unwrap() > changed.period_start().unwrap());
            }
            other => panic!("expected subscription change, got {other:?}"),
        }
    }
}
