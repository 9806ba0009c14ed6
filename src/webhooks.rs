use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use crate::billing::{BillingError, BillingEventEnvelope, BillingEventProcessor};
use crate::config;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-billing-signature";

/// key: webhooks-billing -> provider event entrypoint
///
/// Signature verification happens here, before anything reaches the
/// processor. Events are applied synchronously: a storage failure turns
/// into a 500 so the provider's own redelivery retries the event, while
/// unresolvable or unknown events are acknowledged and dropped.
pub async fn billing_webhook(
    Extension(processor): Extension<BillingEventProcessor>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let now = chrono::Utc::now().timestamp();
    if !verify_signature(
        config::BILLING_WEBHOOK_SECRET.as_str(),
        signature,
        &body,
        now,
        *config::WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
    ) {
        warn!("rejecting billing webhook with invalid signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let envelope: BillingEventEnvelope = serde_json::from_str(&body).map_err(|err| {
        warn!(?err, "billing webhook payload is not a valid event envelope");
        StatusCode::BAD_REQUEST
    })?;
    tracing::info!(event_id = ?envelope.id, event_kind = %envelope.kind, "billing event received");

    match processor.process(envelope.into_event()).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(BillingError::Storage(err)) => {
            error!(?err, "billing event failed on storage, asking provider to redeliver");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(err) => {
            error!(?err, "billing event failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Checks a `t=<unix>,v1=<hex hmac>` signature over `"{t}.{body}"`.
/// Stale timestamps outside the tolerance window are rejected.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut provided: Option<&str> = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => provided = Some(value),
            _ => {}
        }
    }
    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return false;
    };
    if (now_unix - timestamp).abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{timestamp}.{body}").as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    // Hex digests have a fixed length, so a simple comparison is fine here.
    expected == provided
}
