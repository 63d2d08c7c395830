//! Tier configuration and effective-tier resolution.
//!
//! Two tier enumerations coexist and are deliberately distinct types:
//! - `PricingTier` (4 values) classifies what the customer bought and what
//!   the motion type demands.
//! - `ExecutionTier` (3 values) drives the routing registry and the budget
//!   governor.
//!
//! The only bridge between them is [`execution_tier_for`]. Execution never
//! runs below what the content requires; billing the difference is the
//! external upgrade workflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Quality threshold applied uniformly across every tier.
pub const QUALITY_THRESHOLD: f64 = 0.87;

/// Multiplier applied to the per-cycle cap to form the hard ceiling.
/// Expressed as a ratio (3/2) so cost math stays in integer cents.
pub const HARD_CAP_NUM: i64 = 3;
pub const HARD_CAP_DEN: i64 = 2;

/// Customer-facing complexity/pricing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Essential,
    Standard,
    Professional,
    Premium,
}

/// Execution/cost classification used by the registry and the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTier {
    Standard,
    Professional,
    Premium,
}

/// Tier string that could not be mapped to a known execution tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl PricingTier {
    pub const ALL: [PricingTier; 4] = [
        PricingTier::Essential,
        PricingTier::Standard,
        PricingTier::Professional,
        PricingTier::Premium,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PricingTier::Essential => "essential",
            PricingTier::Standard => "standard",
            PricingTier::Professional => "professional",
            PricingTier::Premium => "premium",
        }
    }

    /// List price in cents.
    pub fn price_cents(self) -> i64 {
        match self {
            PricingTier::Essential => 49_500,
            PricingTier::Standard => 89_500,
            PricingTier::Professional => 149_500,
            PricingTier::Premium => 249_500,
        }
    }

    pub fn parse(s: &str) -> Result<PricingTier, UnknownTier> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

impl ExecutionTier {
    pub const ALL: [ExecutionTier; 3] = [
        ExecutionTier::Standard,
        ExecutionTier::Professional,
        ExecutionTier::Premium,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionTier::Standard => "standard",
            ExecutionTier::Professional => "professional",
            ExecutionTier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Result<ExecutionTier, UnknownTier> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

impl fmt::Display for PricingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ExecutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a pricing tier onto the execution tier that serves it.
///
/// Essential and Standard orders run on standard execution; the upper two
/// pricing tiers map one-to-one.
pub fn execution_tier_for(pricing: PricingTier) -> ExecutionTier {
    match pricing {
        PricingTier::Essential | PricingTier::Standard => ExecutionTier::Standard,
        PricingTier::Professional => ExecutionTier::Professional,
        PricingTier::Premium => ExecutionTier::Premium,
    }
}

/// Return whichever of the two pricing tiers ranks higher in complexity.
///
/// Execution must never run below what the motion type requires, even when
/// the customer paid for a lower tier; reconciling the billing difference
/// is the external upgrade workflow.
pub fn resolve_effective_tier(motion_type_tier: PricingTier, paid_tier: PricingTier) -> PricingTier {
    motion_type_tier.max(paid_tier)
}

/// Per-execution-tier policy record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub tier: ExecutionTier,
    /// Revision loops allowed before a forced Protocol-exit.
    pub max_revision_loops: u32,
    /// Soft cap on primary-path cost for one revision cycle, in cents.
    pub per_cycle_cost_cap_cents: i64,
    /// Minimum quality score a phase must reach to advance.
    pub quality_threshold: f64,
}

impl TierPolicy {
    /// Hard per-cycle ceiling: cap x 1.5, never to be exceeded.
    pub fn hard_cycle_cap_cents(&self) -> i64 {
        self.per_cycle_cost_cap_cents * HARD_CAP_NUM / HARD_CAP_DEN
    }

    /// Absolute lifetime spend limit for an order on this tier:
    /// per-cycle cap x max revision loops x 1.5.
    pub fn order_cost_ceiling_cents(&self) -> i64 {
        self.per_cycle_cost_cap_cents * self.max_revision_loops as i64 * HARD_CAP_NUM / HARD_CAP_DEN
    }
}

/// Immutable table of tier policies, one per execution tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTable {
    policies: Vec<TierPolicy>,
}

impl TierTable {
    pub fn policy(&self, tier: ExecutionTier) -> &TierPolicy {
        // Construction guarantees one policy per tier.
        self.policies.iter().find(|p| p.tier == tier).unwrap()
    }

    pub fn policies(&self) -> &[TierPolicy] {
        &self.policies
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            policies: vec![
                TierPolicy {
                    tier: ExecutionTier::Standard,
                    max_revision_loops: 2,
                    per_cycle_cost_cap_cents: 1_500,
                    quality_threshold: QUALITY_THRESHOLD,
                },
                TierPolicy {
                    tier: ExecutionTier::Professional,
                    max_revision_loops: 3,
                    per_cycle_cost_cap_cents: 2_500,
                    quality_threshold: QUALITY_THRESHOLD,
                },
                TierPolicy {
                    tier: ExecutionTier::Premium,
                    max_revision_loops: 4,
                    per_cycle_cost_cap_cents: 4_000,
                    quality_threshold: QUALITY_THRESHOLD,
                },
            ],
        }
    }
}
