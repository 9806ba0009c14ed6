use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel quota meaning "no ceiling".
pub const UNLIMITED: i64 = -1;

/// key: plan-catalog -> named subscription levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    /// Unknown tier strings resolve to the free tier rather than erroring;
    /// the catalog is the wrong place to reject data the processor wrote.
    pub fn parse_or_free(value: &str) -> Self {
        PlanTier::from_str(value).unwrap_or(PlanTier::Free)
    }
}

impl FromStr for PlanTier {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "premium" => Ok(PlanTier::Premium),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: plan-catalog -> metered feature keys
///
/// The set of valid features is exactly this enum; every tier's limit
/// table covers every variant, so the free tier's key set and the valid
/// feature set coincide by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Assessment,
    JournalEntry,
    HabitTracking,
    AiInsights,
}

impl FeatureType {
    pub const ALL: [FeatureType; 4] = [
        FeatureType::Assessment,
        FeatureType::JournalEntry,
        FeatureType::HabitTracking,
        FeatureType::AiInsights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Assessment => "assessment",
            FeatureType::JournalEntry => "journal_entry",
            FeatureType::HabitTracking => "habit_tracking",
            FeatureType::AiInsights => "ai_insights",
        }
    }
}

impl FromStr for FeatureType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "assessment" => Ok(FeatureType::Assessment),
            "journal_entry" => Ok(FeatureType::JournalEntry),
            "habit_tracking" => Ok(FeatureType::HabitTracking),
            "ai_insights" => Ok(FeatureType::AiInsights),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: plan-catalog -> tier/feature quota table
///
/// Immutable after construction; injected into the evaluator rather than
/// read from a mutable global.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    limits: HashMap<PlanTier, HashMap<FeatureType, i64>>,
}

impl PlanCatalog {
    pub fn new(limits: HashMap<PlanTier, HashMap<FeatureType, i64>>) -> Self {
        Self { limits }
    }

    /// Builds the catalog from the optional `PLAN_LIMITS_JSON` override,
    /// falling back to the built-in table.
    pub fn from_env() -> Self {
        match crate::config::PLAN_LIMITS_JSON.as_deref() {
            Some(raw) => match serde_json::from_str::<HashMap<PlanTier, HashMap<FeatureType, i64>>>(
                raw,
            ) {
                Ok(limits) => PlanCatalog::new(limits),
                Err(err) => {
                    tracing::warn!(?err, "PLAN_LIMITS_JSON is invalid; using built-in catalog");
                    PlanCatalog::default()
                }
            },
            None => PlanCatalog::default(),
        }
    }

    /// Quotas for a tier. Tiers missing from the table fall back to the
    /// free tier, and a free tier missing from the table means quota 0.
    pub fn limits_for(&self, tier: PlanTier) -> HashMap<FeatureType, i64> {
        if let Some(limits) = self.limits.get(&tier) {
            return limits.clone();
        }
        self.limits.get(&PlanTier::Free).cloned().unwrap_or_else(|| {
            FeatureType::ALL.iter().map(|f| (*f, 0)).collect()
        })
    }

    pub fn limit_for(&self, tier: PlanTier, feature: FeatureType) -> i64 {
        self.limits_for(tier).get(&feature).copied().unwrap_or(0)
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            PlanTier::Free,
            HashMap::from([
                (FeatureType::Assessment, 2),
                (FeatureType::JournalEntry, 3),
                (FeatureType::HabitTracking, 3),
                (FeatureType::AiInsights, 5),
            ]),
        );
        limits.insert(
            PlanTier::Pro,
            HashMap::from([
                (FeatureType::Assessment, UNLIMITED),
                (FeatureType::JournalEntry, UNLIMITED),
                (FeatureType::HabitTracking, UNLIMITED),
                (FeatureType::AiInsights, 50),
            ]),
        );
        limits.insert(
            PlanTier::Premium,
            HashMap::from([
                (FeatureType::Assessment, UNLIMITED),
                (FeatureType::JournalEntry, UNLIMITED),
                (FeatureType::HabitTracking, UNLIMITED),
                (FeatureType::AiInsights, UNLIMITED),
            ]),
        );
        Self { limits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_limits() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.limit_for(PlanTier::Free, FeatureType::Assessment), 2);
        assert_eq!(
            catalog.limit_for(PlanTier::Pro, FeatureType::Assessment),
            UNLIMITED
        );
        assert_eq!(catalog.limit_for(PlanTier::Pro, FeatureType::AiInsights), 50);
        assert_eq!(
            catalog.limit_for(PlanTier::Premium, FeatureType::AiInsights),
            UNLIMITED
        );
    }

    #[test]
    fn unknown_tier_falls_back_to_free() {
        let mut limits = HashMap::new();
        limits.insert(
            PlanTier::Free,
            HashMap::from([(FeatureType::Assessment, 1)]),
        );
        let catalog = PlanCatalog::new(limits);
        assert_eq!(catalog.limit_for(PlanTier::Premium, FeatureType::Assessment), 1);
    }

    #[test]
    fn tier_and_feature_round_trip_their_keys() {
        assert_eq!(PlanTier::parse_or_free("premium"), PlanTier::Premium);
        assert_eq!(PlanTier::parse_or_free("enterprise"), PlanTier::Free);
        assert_eq!(
            "habit_tracking".parse::<FeatureType>(),
            Ok(FeatureType::HabitTracking)
        );
        assert!("export".parse::<FeatureType>().is_err());
    }
}
