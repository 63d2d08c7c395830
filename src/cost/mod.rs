//! Cost ledger types and per-call cost computation.
//!
//! Every model call appends exactly one [`CostEntry`]; the ledger is never
//! updated or deleted. Tier tags are validated against the fixed execution
//! tier set — an invalid or missing tag degrades to the `UNKNOWN` sentinel
//! with the write still succeeding, because losing cost data is worse than
//! an imprecise tag.

pub mod governor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::phase::PhaseCode;
use crate::tier::ExecutionTier;

/// Sentinel tier tag for unrecognized tier strings.
pub const UNKNOWN_TIER: &str = "UNKNOWN";

/// Fallback token rates (cents per million tokens) for models missing from
/// the pricing table. Deliberately priced at the top of the fleet so
/// budget checks stay conservative.
const FALLBACK_INPUT_RATE: i64 = 1_500;
const FALLBACK_OUTPUT_RATE: i64 = 7_500;

/// Whether a ledger entry came from the primary path or a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    Primary,
    Retry,
}

impl CostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CostSource::Primary => "primary",
            CostSource::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Option<CostSource> {
        match s {
            "primary" => Some(CostSource::Primary),
            "retry" => Some(CostSource::Retry),
            _ => None,
        }
    }
}

/// One append-only ledger row for a single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub order_id: Uuid,
    pub phase: PhaseCode,
    pub model: String,
    /// Execution tier tag, or [`UNKNOWN_TIER`] when the input was invalid.
    pub tier: String,
    /// Revision cycle the call was billed against (0 for the first pass).
    pub revision_cycle: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_cents: i64,
    pub source: CostSource,
    pub attempt: u32,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    /// Build a ledger entry, computing cost from token counts and degrading
    /// an unrecognized tier tag to the sentinel.
    pub fn from_call(
        order_id: Uuid,
        phase: PhaseCode,
        model: &str,
        tier: Option<&str>,
        input_tokens: u64,
        output_tokens: u64,
        source: CostSource,
        attempt: u32,
    ) -> Self {
        let (tier_tag, degraded) = sanitize_tier(tier);
        let mut metadata = serde_json::Map::new();
        if degraded {
            metadata.insert(
                "original_tier".to_string(),
                serde_json::Value::from(tier.unwrap_or("")),
            );
        }
        Self {
            order_id,
            phase,
            model: model.to_string(),
            tier: tier_tag,
            revision_cycle: 0,
            input_tokens,
            output_tokens,
            cost_cents: compute_cost_cents(model, input_tokens, output_tokens),
            source,
            attempt,
            metadata: serde_json::Value::Object(metadata),
            recorded_at: Utc::now(),
        }
    }

    /// Attribute this entry to a revision cycle.
    pub fn with_cycle(mut self, revision_cycle: u32) -> Self {
        self.revision_cycle = revision_cycle;
        self
    }

    /// Whether the tier tag was degraded to the sentinel.
    pub fn tier_degraded(&self) -> bool {
        self.tier == UNKNOWN_TIER
    }
}

/// Validate a tier tag against the fixed execution-tier set.
///
/// Returns the canonical tag and whether degradation occurred. The caller
/// is expected to raise the asynchronous alert on degradation; the warning
/// here covers paths that forget.
pub fn sanitize_tier(raw: Option<&str>) -> (String, bool) {
    match raw.and_then(|s| ExecutionTier::parse(s).ok()) {
        Some(tier) => (tier.as_str().to_string(), false),
        None => {
            warn!(tier = raw.unwrap_or("<missing>"), "unrecognized cost tier, recording as UNKNOWN");
            (UNKNOWN_TIER.to_string(), true)
        }
    }
}

/// Token rates in cents per million tokens: (input, output).
fn token_rates(model: &str) -> (i64, i64) {
    match model {
        "claude-haiku-3-5" => (80, 400),
        "claude-sonnet-4-5" => (300, 1_500),
        "claude-opus-4-1" => (1_500, 7_500),
        _ => {
            warn!(model, "no pricing entry for model, using fallback rates");
            (FALLBACK_INPUT_RATE, FALLBACK_OUTPUT_RATE)
        }
    }
}

/// Compute call cost in cents from token usage, rounding up so partial
/// cents never under-count against a budget cap.
pub fn compute_cost_cents(model: &str, input_tokens: u64, output_tokens: u64) -> i64 {
    let (input_rate, output_rate) = token_rates(model);
    let raw = input_tokens as u128 * input_rate as u128
        + output_tokens as u128 * output_rate as u128;
    raw.div_ceil(1_000_000) as i64
}

/// Cost split by ledger source for one order or one revision cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    pub primary_cents: i64,
    pub retry_cents: i64,
}

impl CostTotals {
    pub fn total_cents(&self) -> i64 {
        self.primary_cents + self.retry_cents
    }

    /// Retry cost as a percentage of primary cost.
    ///
    /// Defined only once primary cost is non-zero.
    pub fn retry_overhead_percent(&self) -> Option<f64> {
        if self.primary_cents > 0 {
            Some(self.retry_cents as f64 / self.primary_cents as f64 * 100.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_known_tier() {
        let (tag, degraded) = sanitize_tier(Some("premium"));
        assert_eq!(tag, "premium");
        assert!(!degraded);
    }

    #[test]
    fn test_sanitize_unknown_tier_degrades() {
        let (tag, degraded) = sanitize_tier(Some("platinum"));
        assert_eq!(tag, UNKNOWN_TIER);
        assert!(degraded);

        let (tag, degraded) = sanitize_tier(None);
        assert_eq!(tag, UNKNOWN_TIER);
        assert!(degraded);
    }

    #[test]
    fn test_entry_from_call_keeps_original_tag_in_metadata() {
        let entry = CostEntry::from_call(
            Uuid::new_v4(),
            PhaseCode::ArgumentDraft,
            "claude-sonnet-4-5",
            Some("gold"),
            1_000,
            500,
            CostSource::Primary,
            1,
        );
        assert!(entry.tier_degraded());
        assert_eq!(entry.metadata["original_tier"], "gold");
    }

    #[test]
    fn test_cost_computation_rounds_up() {
        // 1000 in @ 300c/M + 500 out @ 1500c/M = 0.3 + 0.75 = 1.05 cents -> 2
        let cents = compute_cost_cents("claude-sonnet-4-5", 1_000, 500);
        assert_eq!(cents, 2);
    }

    #[test]
    fn test_cost_computation_large_call() {
        // 200k in @ 1500c/M + 30k out @ 7500c/M = 300 + 225 = 525 cents
        let cents = compute_cost_cents("claude-opus-4-1", 200_000, 30_000);
        assert_eq!(cents, 525);
    }

    #[test]
    fn test_unknown_model_uses_fallback_rates() {
        let cents = compute_cost_cents("mystery-model", 1_000_000, 0);
        assert_eq!(cents, FALLBACK_INPUT_RATE);
    }

    #[test]
    fn test_retry_overhead_percent() {
        let totals = CostTotals {
            primary_cents: 400,
            retry_cents: 100,
        };
        assert_eq!(totals.retry_overhead_percent(), Some(25.0));
        assert_eq!(totals.total_cents(), 500);
    }

    #[test]
    fn test_retry_overhead_undefined_without_primary_cost() {
        let totals = CostTotals {
            primary_cents: 0,
            retry_cents: 100,
        };
        assert_eq!(totals.retry_overhead_percent(), None);
    }

    #[test]
    fn test_source_roundtrip() {
        assert_eq!(CostSource::parse("primary"), Some(CostSource::Primary));
        assert_eq!(CostSource::parse("retry"), Some(CostSource::Retry));
        assert_eq!(CostSource::parse("secondary"), None);
        assert_eq!(CostSource::Retry.as_str(), "retry");
    }
}
