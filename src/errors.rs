//! Typed error hierarchy for the orchestration engine.
//!
//! Two top-level types cover the two failure classes:
//! - `LookupError` — unknown phase/tier in the routing registry; always
//!   fatal configuration errors, never defaulted around
//! - `EngineError` — lifecycle, budget, storage, and collaborator failures
//!
//! `ConcurrencyConflict` is deliberately not a system fault: the caller
//! refetches the order and retries with the fresh `status_version`.

use thiserror::Error;

use crate::order::OrderStatus;
use crate::phase::PhaseCode;
use crate::tier::ExecutionTier;

/// Unknown phase or tier presented to the routing registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no route registered for phase {phase} on tier {tier}")]
    RouteNotFound {
        phase: PhaseCode,
        tier: ExecutionTier,
    },

    #[error("unknown phase code: {0}")]
    UnknownPhase(String),

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

/// Errors from the order lifecycle, the budget governor, and persistence.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: String },

    #[error(
        "status version conflict on order {order_id}: expected {expected}, refresh and retry"
    )]
    ConcurrencyConflict { order_id: String, expected: i64 },

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("hard budget cap breached for order {order_id}: {total_cents} cents against ceiling {ceiling_cents}")]
    BudgetExceeded {
        order_id: String,
        total_cents: i64,
        ceiling_cents: i64,
    },

    #[error("model call failed after {attempts} attempts: {message}")]
    ExternalCallFailure { attempts: u32, message: String },

    #[error("refund override justification must be at least {min} characters")]
    JustificationTooShort { min: usize },

    #[error("no revision loops remain for order {order_id} (tier allows {max})")]
    RevisionBudgetExhausted { order_id: String, max: u32 },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller can resolve this by refetching and retrying.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict { .. })
    }
}
