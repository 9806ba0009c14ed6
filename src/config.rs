use once_cell::sync::Lazy;

/// Secret used to verify billing provider webhook signatures. Must be set
/// via the `BILLING_WEBHOOK_SECRET` env variable.
pub static BILLING_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_WEBHOOK_SECRET").expect("BILLING_WEBHOOK_SECRET must be set")
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: billing-config -> optional JSON override for the price->tier table
///
/// Shape: `{"price_ids": {"price_abc": "pro"}, "amounts": {"999": "pro"}}`.
/// When unset the processor falls back to the built-in table.
pub static BILLING_PRICE_TABLE_JSON: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_PRICE_TABLE_JSON"));

/// key: plan-catalog-config -> optional JSON override for per-tier quotas
///
/// Shape: `{"free": {"assessment": 2, ...}, "pro": {...}, "premium": {...}}`,
/// with `-1` meaning unlimited. When unset the built-in catalog applies.
pub static PLAN_LIMITS_JSON: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("PLAN_LIMITS_JSON"));

/// Seconds of clock skew tolerated when checking webhook signature timestamps.
pub static WEBHOOK_TIMESTAMP_TOLERANCE_SECS: Lazy<i64> = Lazy::new(|| {
    std::env::var("WEBHOOK_TIMESTAMP_TOLERANCE_SECS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

fn read_optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
