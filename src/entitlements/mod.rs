pub mod api;
pub mod catalog;
pub mod models;
pub mod service;

pub use api::{
    check_usage, get_subscription, get_usage, record_usage, reset_usage, IncrementResponse,
    ResetResponse, UsageEnvelope,
};
pub use catalog::{FeatureType, PlanCatalog, PlanTier, UNLIMITED};
pub use models::{EntitlementDecision, FeatureUsage, Subscription, UsageCounter};
pub use service::{EntitlementError, EntitlementResult, EntitlementService};
