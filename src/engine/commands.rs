//! Command surface over order lifecycle state.
//!
//! Every mutating command supplies the caller's last-observed
//! `status_version`. A stale version fails up front with
//! `ConcurrencyConflict` ("refresh and retry"), and the store's
//! compare-and-swap closes the window between the check and the write.
//! The admin surface, the phase driver, and scheduled sweeps all race
//! through this same mechanism; nobody gets last-write-wins.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::events::{EngineEvent, EventSink};
use crate::errors::EngineError;
use crate::order::{HoldReason, Order, OrderStatus};
use crate::phase::PhaseCode;
use crate::refund::{calculate_refund_suggestion, RefundAuditRecord, RefundSuggestion};
use crate::store::EngineStore;
use crate::tier::{execution_tier_for, PricingTier};

pub struct OrderCommands {
    store: Arc<EngineStore>,
    config: Arc<EngineConfig>,
    events: Arc<dyn EventSink>,
}

impl OrderCommands {
    pub fn new(
        store: Arc<EngineStore>,
        config: Arc<EngineConfig>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    fn load_checked(&self, order_id: Uuid, expected_version: i64) -> Result<Order, EngineError> {
        let order = self.store.get_order(order_id)?;
        if order.status_version != expected_version {
            return Err(EngineError::ConcurrencyConflict {
                order_id: order_id.to_string(),
                expected: expected_version,
            });
        }
        Ok(order)
    }

    fn transition(&self, order: &mut Order, to: OrderStatus) -> Result<(), EngineError> {
        order.status.validate_transition(to)?;
        let from = order.status;
        order.status = to;
        self.store.commit_order(order)?;
        info!(order = %order.order_number, %from, %to, "status transition");
        Ok(())
    }

    /// Intake accepted; the pipeline starts at phase I.
    pub fn begin_processing(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        order.current_phase = Some(PhaseCode::IntakeReview);
        self.transition(&mut order, OrderStatus::Processing)?;
        Ok(order)
    }

    /// Customer approved the deliverable at the checkpoint.
    pub fn approve_checkpoint(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        self.transition(&mut order, OrderStatus::Completed)?;
        Ok(order)
    }

    /// Customer requested changes at the checkpoint.
    ///
    /// Refused once the tier's revision loops are spent; the remaining
    /// options at that point are approval or cancellation.
    pub fn request_changes(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        let policy = self.config.tiers.policy(order.execution_tier);
        if order.revision_count >= policy.max_revision_loops {
            return Err(EngineError::RevisionBudgetExhausted {
                order_id: order_id.to_string(),
                max: policy.max_revision_loops,
            });
        }
        self.transition(&mut order, OrderStatus::RevisionRequested)?;
        Ok(order)
    }

    /// Scheduler picks a revision request back up into processing.
    pub fn resume_revision(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        order.revision_count += 1;
        order.current_phase = Some(PhaseCode::RevisionCycle);
        self.transition(&mut order, OrderStatus::Processing)?;
        Ok(order)
    }

    /// Customer-initiated cancellation with an advisory partial refund.
    pub fn cancel_order(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<(Order, RefundSuggestion), EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        let full_refund = order.status == OrderStatus::Intake;
        self.transition(&mut order, OrderStatus::CancelledUser)?;

        let suggestion = if full_refund {
            RefundSuggestion {
                percentage: 100,
                amount_cents: order.amount_paid_cents,
                justification: "Cancelled before processing began".to_string(),
                needs_manual_review: false,
            }
        } else {
            let phase_code = order.current_phase.map(|p| p.code()).unwrap_or("I");
            calculate_refund_suggestion(order.amount_paid_cents, phase_code)
        };
        self.events.emit(EngineEvent::OrderCancelled {
            order_number: order.order_number.clone(),
            refund_suggested_cents: suggestion.amount_cents,
            full_refund,
        });
        Ok((order, suggestion))
    }

    /// Admin overrides the suggested refund amount.
    ///
    /// State is not mutated here — payment capture is external — but the
    /// caller's version is still checked so the audit record reflects the
    /// order the admin was actually looking at.
    pub fn override_refund(
        &self,
        order_id: Uuid,
        expected_version: i64,
        actual_cents: i64,
        admin: &str,
        justification: &str,
    ) -> Result<RefundAuditRecord, EngineError> {
        let order = self.load_checked(order_id, expected_version)?;
        let phase_code = order.current_phase.map(|p| p.code()).unwrap_or("I");
        let suggestion = calculate_refund_suggestion(order.amount_paid_cents, phase_code);
        let record = RefundAuditRecord::build(&suggestion, actual_cents, admin, justification)?;
        info!(
            order = %order.order_number,
            suggested = record.suggested_cents,
            actual = record.actual_cents,
            deviated = record.deviated,
            "refund override recorded"
        );
        Ok(record)
    }

    /// Park the order pending customer input (evidence gap etc.).
    pub fn place_hold(
        &self,
        order_id: Uuid,
        expected_version: i64,
        reason: HoldReason,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        let expires_at = Utc::now() + self.config.hold_expiry;
        order.hold_reason = Some(reason.as_str().to_string());
        order.hold_escalated = false;
        order.hold_expires_at = Some(expires_at);
        self.transition(&mut order, OrderStatus::HoldPending)?;
        self.events.emit(EngineEvent::HoldCreated {
            order_number: order.order_number.clone(),
            reason: reason.as_str().to_string(),
            expires_at,
        });
        Ok(order)
    }

    /// Customer supplied what was missing; resume processing.
    pub fn release_hold(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        order.hold_reason = None;
        order.hold_escalated = false;
        order.hold_expires_at = None;
        self.transition(&mut order, OrderStatus::Processing)?;
        Ok(order)
    }

    /// Possible conflict of interest spotted; pause for human review.
    pub fn flag_conflict(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        self.transition(&mut order, OrderStatus::PendingConflictReview)?;
        Ok(order)
    }

    /// Conflict review concluded: cleared back to processing, or cancelled.
    pub fn resolve_conflict(
        &self,
        order_id: Uuid,
        expected_version: i64,
        conflict_confirmed: bool,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        if conflict_confirmed {
            self.transition(&mut order, OrderStatus::CancelledConflict)?;
            self.events.emit(EngineEvent::OrderCancelled {
                order_number: order.order_number.clone(),
                refund_suggested_cents: order.amount_paid_cents,
                full_refund: true,
            });
        } else {
            self.transition(&mut order, OrderStatus::Processing)?;
        }
        Ok(order)
    }

    /// External capacity signal cleared; resume processing.
    pub fn resume_from_capacity(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        self.transition(&mut order, OrderStatus::Processing)?;
        Ok(order)
    }

    /// The motion's content requires a higher tier than was paid for.
    pub fn request_upgrade(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        self.transition(&mut order, OrderStatus::UpgradePending)?;
        Ok(order)
    }

    /// Billing reconciled; apply the new paid tier and resume.
    ///
    /// Execution never steps down: the effective execution tier is the
    /// higher of the current one and the one the new pricing maps to.
    pub fn complete_upgrade(
        &self,
        order_id: Uuid,
        expected_version: i64,
        new_paid_tier: PricingTier,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        order.paid_tier = new_paid_tier;
        order.execution_tier = order.execution_tier.max(execution_tier_for(new_paid_tier));
        self.transition(&mut order, OrderStatus::Processing)?;
        Ok(order)
    }

    /// Payment dispute opened before completion.
    pub fn open_dispute(
        &self,
        order_id: Uuid,
        expected_version: i64,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        self.transition(&mut order, OrderStatus::Disputed)?;
        Ok(order)
    }

    /// Dispute concluded: refunded, or resumed.
    pub fn resolve_dispute(
        &self,
        order_id: Uuid,
        expected_version: i64,
        refund: bool,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        let to = if refund {
            OrderStatus::Refunded
        } else {
            OrderStatus::Processing
        };
        self.transition(&mut order, to)?;
        Ok(order)
    }

    /// Toggle the litigation legal hold; held orders are exempt from
    /// automatic cancellation sweeps.
    pub fn set_legal_hold(
        &self,
        order_id: Uuid,
        expected_version: i64,
        legal_hold: bool,
    ) -> Result<Order, EngineError> {
        let mut order = self.load_checked(order_id, expected_version)?;
        order.legal_hold = legal_hold;
        self.store.commit_order(&mut order)?;
        Ok(order)
    }
}
