pub mod events;
pub mod processor;

pub use events::{
    BillingEvent, BillingEventEnvelope, CheckoutCompleted, PaymentFailed, PaymentSucceeded,
    PriceRef, PriceTable, SubscriptionChanged, SubscriptionDeleted,
};
pub use processor::{BillingError, BillingEventProcessor, EventOutcome};
