//! Order data model and lifecycle state machine.
//!
//! The transition table here is the one authority on which status moves are
//! legal. The store enforces *who wins* a race (compare-and-swap on
//! `status_version`); this module enforces *what is allowed at all*.
//! Terminal states reject every outgoing transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::phase::PhaseCode;
use crate::tier::{ExecutionTier, PricingTier};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Intake,
    Processing,
    AwaitingModelCapacity,
    HoldPending,
    ProtocolExit,
    UpgradePending,
    PendingConflictReview,
    AwaitingApproval,
    RevisionRequested,
    Completed,
    CancelledUser,
    CancelledSystem,
    CancelledConflict,
    Refunded,
    Disputed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Intake => "intake",
            OrderStatus::Processing => "processing",
            OrderStatus::AwaitingModelCapacity => "awaiting_model_capacity",
            OrderStatus::HoldPending => "hold_pending",
            OrderStatus::ProtocolExit => "protocol_exit",
            OrderStatus::UpgradePending => "upgrade_pending",
            OrderStatus::PendingConflictReview => "pending_conflict_review",
            OrderStatus::AwaitingApproval => "awaiting_approval",
            OrderStatus::RevisionRequested => "revision_requested",
            OrderStatus::Completed => "completed",
            OrderStatus::CancelledUser => "cancelled_user",
            OrderStatus::CancelledSystem => "cancelled_system",
            OrderStatus::CancelledConflict => "cancelled_conflict",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Disputed => "disputed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        use OrderStatus::*;
        let all = [
            Intake,
            Processing,
            AwaitingModelCapacity,
            HoldPending,
            ProtocolExit,
            UpgradePending,
            PendingConflictReview,
            AwaitingApproval,
            RevisionRequested,
            Completed,
            CancelledUser,
            CancelledSystem,
            CancelledConflict,
            Refunded,
            Disputed,
            Failed,
        ];
        all.into_iter().find(|status| status.as_str() == s)
    }

    /// Terminal states accept no outgoing transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::CancelledUser
                | OrderStatus::CancelledSystem
                | OrderStatus::CancelledConflict
                | OrderStatus::Refunded
                | OrderStatus::Failed
        )
    }

    /// Whether `self -> to` is a legal lifecycle move.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (Intake, Processing) | (Intake, CancelledUser) => true,

            // External capacity backpressure, both directions.
            (Processing, AwaitingModelCapacity) | (AwaitingModelCapacity, Processing) => true,

            // Evidence-gap holds; expiry auto-cancels.
            (Processing, HoldPending)
            | (HoldPending, Processing)
            | (HoldPending, CancelledSystem) => true,

            // Exhausted revision loops or breached hard ceiling.
            (Processing, ProtocolExit)
            | (ProtocolExit, AwaitingApproval)
            | (ProtocolExit, CancelledSystem) => true,

            // Conflict screening.
            (Processing, PendingConflictReview)
            | (PendingConflictReview, Processing)
            | (PendingConflictReview, CancelledConflict) => true,

            // Upgrade workflow.
            (Processing, UpgradePending) | (UpgradePending, Processing) => true,

            // Checkpoint and its outcomes.
            (Processing, AwaitingApproval)
            | (AwaitingApproval, Completed)
            | (AwaitingApproval, RevisionRequested)
            | (AwaitingApproval, CancelledUser)
            | (RevisionRequested, Processing) => true,

            // Customer cancellation and hard failure mid-pipeline.
            (Processing, CancelledUser) | (Processing, Failed) => true,

            // Payment disputes arrive before completion and resolve either
            // way.
            (Processing, Disputed)
            | (AwaitingApproval, Disputed)
            | (Disputed, Refunded)
            | (Disputed, Processing) => true,

            _ => false,
        }
    }

    /// Validate a transition, producing the engine error on refusal.
    pub fn validate_transition(self, to: OrderStatus) -> Result<(), EngineError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason an order is parked in `HoldPending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    EvidenceGap,
    ClientQuestion,
    Other(String),
}

impl HoldReason {
    pub fn as_str(&self) -> &str {
        match self {
            HoldReason::EvidenceGap => "evidence_gap",
            HoldReason::ClientQuestion => "client_question",
            HoldReason::Other(s) => s,
        }
    }
}

/// One customer order for a generated motion.
///
/// `status_version` increases by exactly one per successful write; every
/// mutating caller presents the last version it observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub status_version: i64,
    pub motion_type: String,
    pub paid_tier: PricingTier,
    pub execution_tier: ExecutionTier,
    pub current_phase: Option<PhaseCode>,
    pub amount_paid_cents: i64,
    pub cost_cap_triggered: bool,
    pub hold_reason: Option<String>,
    pub hold_escalated: bool,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub revision_count: u32,
    pub legal_hold: bool,
    pub recipient_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly intaken order, before processing begins.
    pub fn new_intake(
        order_number: &str,
        motion_type: &str,
        paid_tier: PricingTier,
        execution_tier: ExecutionTier,
        amount_paid_cents: i64,
        recipient_email: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_number: order_number.to_string(),
            status: OrderStatus::Intake,
            status_version: 0,
            motion_type: motion_type.to_string(),
            paid_tier,
            execution_tier,
            current_phase: None,
            amount_paid_cents,
            cost_cap_triggered: false,
            hold_reason: None,
            hold_escalated: false,
            hold_expires_at: None,
            revision_count: 0,
            legal_hold: false,
            recipient_email: recipient_email.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
