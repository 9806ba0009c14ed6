use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;

use super::catalog::FeatureType;
use super::models::{EntitlementDecision, FeatureUsage, Subscription};
use super::service::{EntitlementError, EntitlementService};

/// key: entitlement-api -> rest endpoints
///
/// The caller's identity is established upstream; the user id in the path
/// is trusted as supplied by the identity provider.
pub async fn get_usage(
    Extension(service): Extension<EntitlementService>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UsageEnvelope>> {
    let features = service.usage_snapshot(user_id).await?;
    Ok(Json(UsageEnvelope { user_id, features }))
}

pub async fn check_usage(
    Extension(service): Extension<EntitlementService>,
    Path((user_id, feature)): Path<(Uuid, String)>,
) -> AppResult<Json<EntitlementDecision>> {
    let feature = parse_feature(&feature)?;
    let decision = service.can_use(user_id, feature).await?;
    Ok(Json(decision))
}

pub async fn record_usage(
    Extension(service): Extension<EntitlementService>,
    Path((user_id, feature)): Path<(Uuid, String)>,
) -> AppResult<Json<IncrementResponse>> {
    let feature = parse_feature(&feature)?;
    let used = service.try_increment(user_id, feature).await?;
    Ok(Json(IncrementResponse { feature, used }))
}

pub async fn reset_usage(
    Extension(service): Extension<EntitlementService>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ResetResponse>> {
    let counters_reset = service.reset_user_usage(user_id).await?;
    Ok(Json(ResetResponse {
        user_id,
        counters_reset,
    }))
}

pub async fn get_subscription(
    Extension(service): Extension<EntitlementService>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Subscription>> {
    let subscription = service.subscription_status(user_id).await?;
    Ok(Json(subscription))
}

fn parse_feature(raw: &str) -> Result<FeatureType, EntitlementError> {
    raw.parse::<FeatureType>()
        .map_err(|_| EntitlementError::InvalidFeature(raw.to_string()))
}

#[derive(Debug, Serialize)]
pub struct UsageEnvelope {
    pub user_id: Uuid,
    pub features: Vec<FeatureUsage>,
}

#[derive(Debug, Serialize)]
pub struct IncrementResponse {
    pub feature: FeatureType,
    pub used: i64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub user_id: Uuid,
    pub counters_reset: u64,
}
