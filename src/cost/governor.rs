//! Budget governor: advisory soft cap, must-not-exceed hard cap, and the
//! order-level lifetime ceiling.
//!
//! Budget checks are gates evaluated around model dispatch, not database
//! constraints. The soft cap can be transiently exceeded by concurrent
//! retries; only the hard cap (cap x 1.5) is a boundary that forces a
//! Protocol-exit, checked immediately after every cost write.

use serde::{Deserialize, Serialize};

use crate::cost::CostTotals;
use crate::tier::TierPolicy;

/// Result of evaluating one revision cycle's spend against tier policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCheck {
    /// Primary-path cost within the per-cycle cap.
    pub primary_ok: bool,
    /// Total (primary + retry) cost within cap x 1.5.
    pub total_ok: bool,
    pub primary_cents: i64,
    pub total_cents: i64,
    pub soft_cap_cents: i64,
    pub hard_cap_cents: i64,
}

impl BudgetCheck {
    /// Whether the cycle breached the must-not-exceed boundary.
    pub fn hard_breach(&self) -> bool {
        !self.total_ok
    }
}

/// Evaluate a cycle's cost split against the tier's caps.
///
/// `primary_ok` flips once primary cost exceeds the cap; `total_ok` flips
/// once primary + retry exceeds cap x 1.5. Reaching a cap exactly is still
/// within budget.
pub fn check_budget_enforcement(policy: &TierPolicy, totals: CostTotals) -> BudgetCheck {
    let soft_cap_cents = policy.per_cycle_cost_cap_cents;
    let hard_cap_cents = policy.hard_cycle_cap_cents();
    BudgetCheck {
        primary_ok: totals.primary_cents <= soft_cap_cents,
        total_ok: totals.total_cents() <= hard_cap_cents,
        primary_cents: totals.primary_cents,
        total_cents: totals.total_cents(),
        soft_cap_cents,
        hard_cap_cents,
    }
}

/// Evaluate lifetime spend against the order-level ceiling
/// (per-cycle cap x max revision loops x 1.5), independent of how many
/// cycles actually ran.
pub fn within_order_ceiling(policy: &TierPolicy, lifetime_total_cents: i64) -> bool {
    lifetime_total_cents <= policy.order_cost_ceiling_cents()
}
