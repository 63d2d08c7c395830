//! The phase driver: one idempotent step per scheduler delivery.
//!
//! An external durable scheduler invokes [`PhaseDriver::run_phase`] with
//! at-least-once delivery; a re-delivered step for an already-completed
//! phase only advances the phase pointer. Cancellation and cost-cap
//! signals are checked at phase boundaries only — an in-flight model call
//! runs to completion and its cost is recorded before any exit finalizes.
//!
//! Racing writers (admin commands, timeout sweeps, this driver) are
//! serialized solely by the store's status-version compare-and-swap; a
//! lost race surfaces as `ConcurrencyConflict` and the scheduler re-runs
//! the step against fresh state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::citations::caselaw::extract_case_citations;
use crate::citations::extract_statutory;
use crate::config::EngineConfig;
use crate::cost::governor::{check_budget_enforcement, within_order_ceiling};
use crate::cost::{CostEntry, CostSource};
use crate::engine::events::{EngineEvent, EventSink, ProtocolExitReason};
use crate::engine::model::{ModelCallError, ModelClient, ModelRequest};
use crate::errors::EngineError;
use crate::order::{Order, OrderStatus};
use crate::phase::PhaseCode;
use crate::refund::calculate_refund_suggestion;
use crate::store::{CitationResults, EngineStore, ExecutionStatus};
use crate::tier::TierPolicy;
use uuid::Uuid;

/// What a single phase step accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Phase completed; the order moved to the next phase.
    Advanced { next: PhaseCode },
    /// Final phase completed; the order awaits the approval checkpoint.
    CheckpointReached,
    /// Quality gate failed with revision budget remaining; the same phase
    /// re-runs on the next cycle.
    RevisionScheduled { revision_count: u32 },
    /// Revision loops or a hard cost boundary forced the exit path.
    ProtocolExited { reason: ProtocolExitReason },
    /// Provider capacity backpressure parked the order.
    DeferredForCapacity,
    /// Order was not in a runnable state; nothing happened.
    Skipped { status: OrderStatus },
}

/// Result of one hold sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldSweepStats {
    pub escalated: usize,
    pub cancelled: usize,
    pub lost_races: usize,
}

pub struct PhaseDriver {
    store: Arc<EngineStore>,
    config: Arc<EngineConfig>,
    model: Arc<dyn ModelClient>,
    events: Arc<dyn EventSink>,
}

impl PhaseDriver {
    pub fn new(
        store: Arc<EngineStore>,
        config: Arc<EngineConfig>,
        model: Arc<dyn ModelClient>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            config,
            model,
            events,
        }
    }

    /// Execute the order's current phase as one idempotent step.
    pub async fn run_phase(&self, order_id: Uuid) -> Result<PhaseOutcome, EngineError> {
        let mut order = self.store.get_order(order_id)?;
        if order.status != OrderStatus::Processing {
            return Ok(PhaseOutcome::Skipped {
                status: order.status,
            });
        }
        let phase = order.current_phase.unwrap_or(PhaseCode::IntakeReview);

        // Re-delivered step for a phase that already finished: only move
        // the pointer, producing no duplicate executions or cost entries.
        if self.store.has_completed_execution(order.id, phase)? {
            return self.advance(&mut order, phase);
        }

        let policy = *self.config.tiers.policy(order.execution_tier);
        let route = self
            .config
            .registry
            .lookup(phase, order.execution_tier)?
            .clone();
        let attempt = self.store.attempt_count(order.id, phase)? + 1;
        let exec_id = self.store.insert_phase_execution(order.id, phase, attempt)?;
        info!(
            order = %order.order_number,
            phase = %phase,
            model = %route.model,
            attempt,
            "dispatching phase"
        );

        let request = ModelRequest {
            model: route.model.clone(),
            reasoning_budget: route.reasoning_budget,
            max_tokens: route.max_tokens,
            prompt: build_prompt(&order, phase),
        };

        // Bounded call loop: every attempt, success or failure, lands in
        // the ledger before the next decision.
        let mut call_attempt = 0u32;
        let response = loop {
            call_attempt += 1;
            match self.model.complete(request.clone()).await {
                Ok(response) => {
                    let entry = CostEntry::from_call(
                        order.id,
                        phase,
                        &route.model,
                        Some(order.execution_tier.as_str()),
                        response.input_tokens,
                        response.output_tokens,
                        CostSource::Primary,
                        call_attempt,
                    )
                    .with_cycle(order.revision_count);
                    self.record_cost(&order, entry)?;
                    break response;
                }
                Err(ModelCallError::CapacityExhausted) => {
                    self.store.finish_phase_execution(
                        exec_id,
                        ExecutionStatus::Blocked,
                        None,
                        Some("model capacity exhausted"),
                    )?;
                    order
                        .status
                        .validate_transition(OrderStatus::AwaitingModelCapacity)?;
                    order.status = OrderStatus::AwaitingModelCapacity;
                    self.store.commit_order(&mut order)?;
                    info!(order = %order.order_number, "deferred for model capacity");
                    return Ok(PhaseOutcome::DeferredForCapacity);
                }
                Err(ModelCallError::Failed {
                    message,
                    input_tokens,
                    output_tokens,
                }) => {
                    warn!(
                        order = %order.order_number,
                        phase = %phase,
                        attempt = call_attempt,
                        %message,
                        "model call failed"
                    );
                    let entry = CostEntry::from_call(
                        order.id,
                        phase,
                        &route.model,
                        Some(order.execution_tier.as_str()),
                        input_tokens,
                        output_tokens,
                        CostSource::Retry,
                        call_attempt,
                    )
                    .with_cycle(order.revision_count);
                    self.record_cost(&order, entry)?;

                    if let Some(reason) = self.budget_breach(&order, &policy)? {
                        self.store.finish_phase_execution(
                            exec_id,
                            ExecutionStatus::Failed,
                            None,
                            Some("hard budget cap breached"),
                        )?;
                        self.protocol_exit(&mut order, reason)?;
                        return Ok(PhaseOutcome::ProtocolExited { reason });
                    }
                    if call_attempt >= self.config.max_call_attempts {
                        self.store.finish_phase_execution(
                            exec_id,
                            ExecutionStatus::Failed,
                            None,
                            Some(message.as_str()),
                        )?;
                        return Err(EngineError::ExternalCallFailure {
                            attempts: call_attempt,
                            message,
                        });
                    }
                }
            }
        };

        // Hard boundary check immediately after the successful call's cost
        // write; the completed call is billed even when it tips the cap.
        if let Some(reason) = self.budget_breach(&order, &policy)? {
            self.store.finish_phase_execution(
                exec_id,
                ExecutionStatus::Failed,
                None,
                Some("hard budget cap breached"),
            )?;
            self.protocol_exit(&mut order, reason)?;
            return Ok(PhaseOutcome::ProtocolExited { reason });
        }

        // Soft cap is advisory: flag once, keep going.
        let cycle = self
            .store
            .cycle_cost_totals(order.id, order.revision_count)?;
        let check = check_budget_enforcement(&policy, cycle);
        if !check.primary_ok && !order.cost_cap_triggered {
            order.cost_cap_triggered = true;
            self.events.emit(EngineEvent::BudgetAlert {
                order_number: order.order_number.clone(),
                primary_cents: check.primary_cents,
                soft_cap_cents: check.soft_cap_cents,
            });
        }

        if phase.runs_citation_pipelines() {
            let results = CitationResults {
                statutory: extract_statutory(&response.output),
                caselaw: extract_case_citations(&response.output),
            };
            info!(
                order = %order.order_number,
                phase = %phase,
                statutory = results.statutory.len(),
                caselaw = results.caselaw.len(),
                "citation pipelines complete"
            );
            self.store.save_citation_results(order.id, phase, &results)?;
        }

        // Quality gate. Unscored phases pass; scored phases below the
        // uniform threshold consume revision budget or force the exit.
        if let Some(score) = response.quality_score {
            if score < policy.quality_threshold {
                if order.revision_count >= policy.max_revision_loops {
                    self.store.finish_phase_execution(
                        exec_id,
                        ExecutionStatus::RequiresReview,
                        Some(score),
                        Some("quality below threshold with revision budget exhausted"),
                    )?;
                    let reason = ProtocolExitReason::RevisionLoopsExhausted;
                    self.protocol_exit(&mut order, reason)?;
                    return Ok(PhaseOutcome::ProtocolExited { reason });
                }
                order.revision_count += 1;
                self.store.finish_phase_execution(
                    exec_id,
                    ExecutionStatus::RequiresReview,
                    Some(score),
                    None,
                )?;
                self.store.commit_order(&mut order)?;
                info!(
                    order = %order.order_number,
                    phase = %phase,
                    score,
                    revision = order.revision_count,
                    "quality gate failed, revision scheduled"
                );
                return Ok(PhaseOutcome::RevisionScheduled {
                    revision_count: order.revision_count,
                });
            }
        }

        self.store.finish_phase_execution(
            exec_id,
            ExecutionStatus::Completed,
            response.quality_score,
            None,
        )?;
        self.advance(&mut order, phase)
    }

    /// Record a ledger entry and raise the asynchronous alert if the tier
    /// tag degraded to the sentinel.
    pub fn record_cost(&self, order: &Order, entry: CostEntry) -> Result<(), EngineError> {
        let degraded = entry.tier_degraded();
        let original = entry
            .metadata
            .get("original_tier")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.store.append_cost_entry(&entry)?;
        if degraded {
            self.events.emit(EngineEvent::CostTierUnknown {
                order_number: order.order_number.clone(),
                original_tag: original,
            });
        }
        Ok(())
    }

    /// Escalate aging holds and auto-cancel expired ones.
    ///
    /// Lost CAS races mean another actor (typically an admin releasing the
    /// hold) got there first; the sweep skips those rows.
    pub fn sweep_holds(&self, now: DateTime<Utc>) -> Result<HoldSweepStats, EngineError> {
        let mut stats = HoldSweepStats::default();
        for mut order in self.store.orders_on_hold()? {
            let Some(expires_at) = order.hold_expires_at else {
                continue;
            };
            if now >= expires_at {
                if order.legal_hold {
                    warn!(order = %order.order_number, "hold expired but order is under legal hold");
                    continue;
                }
                order
                    .status
                    .validate_transition(OrderStatus::CancelledSystem)?;
                order.status = OrderStatus::CancelledSystem;
                match self.store.commit_order(&mut order) {
                    Ok(()) => {
                        stats.cancelled += 1;
                        let phase_code =
                            order.current_phase.map(|p| p.code()).unwrap_or("I");
                        let suggestion =
                            calculate_refund_suggestion(order.amount_paid_cents, phase_code);
                        self.events.emit(EngineEvent::HoldExpired {
                            order_number: order.order_number.clone(),
                        });
                        self.events.emit(EngineEvent::OrderCancelled {
                            order_number: order.order_number.clone(),
                            refund_suggested_cents: suggestion.amount_cents,
                            full_refund: false,
                        });
                        info!(order = %order.order_number, "hold expired, order auto-cancelled");
                    }
                    Err(EngineError::ConcurrencyConflict { .. }) => stats.lost_races += 1,
                    Err(other) => return Err(other),
                }
            } else {
                let escalate_at =
                    expires_at - self.config.hold_expiry + self.config.hold_escalation;
                if !order.hold_escalated && now >= escalate_at {
                    order.hold_escalated = true;
                    match self.store.commit_order(&mut order) {
                        Ok(()) => {
                            stats.escalated += 1;
                            self.events.emit(EngineEvent::HoldEscalated {
                                order_number: order.order_number.clone(),
                                expires_at,
                            });
                        }
                        Err(EngineError::ConcurrencyConflict { .. }) => stats.lost_races += 1,
                        Err(other) => return Err(other),
                    }
                }
            }
        }
        Ok(stats)
    }

    fn budget_breach(
        &self,
        order: &Order,
        policy: &TierPolicy,
    ) -> Result<Option<ProtocolExitReason>, EngineError> {
        let cycle = self
            .store
            .cycle_cost_totals(order.id, order.revision_count)?;
        if check_budget_enforcement(policy, cycle).hard_breach() {
            return Ok(Some(ProtocolExitReason::HardCostCapBreached));
        }
        let lifetime = self.store.order_cost_totals(order.id)?;
        if !within_order_ceiling(policy, lifetime.total_cents()) {
            return Ok(Some(ProtocolExitReason::OrderCeilingBreached));
        }
        Ok(None)
    }

    /// Route through PROTOCOL_EXIT: a human-review checkpoint when a
    /// deliverable draft exists, an automatic full-refund cancellation
    /// otherwise.
    fn protocol_exit(
        &self,
        order: &mut Order,
        reason: ProtocolExitReason,
    ) -> Result<(), EngineError> {
        order.status.validate_transition(OrderStatus::ProtocolExit)?;
        order.status = OrderStatus::ProtocolExit;
        if !matches!(reason, ProtocolExitReason::RevisionLoopsExhausted) {
            order.cost_cap_triggered = true;
        }
        self.store.commit_order(order)?;

        let deliverable_exists = order
            .current_phase
            .map(|p| p.has_deliverable())
            .unwrap_or(false);
        self.events.emit(EngineEvent::ProtocolExit {
            order_number: order.order_number.clone(),
            reason,
            deliverable_exists,
        });
        warn!(
            order = %order.order_number,
            ?reason,
            deliverable_exists,
            "protocol exit"
        );

        if deliverable_exists {
            order
                .status
                .validate_transition(OrderStatus::AwaitingApproval)?;
            order.status = OrderStatus::AwaitingApproval;
            self.store.commit_order(order)?;
            self.events.emit(EngineEvent::DocumentsReady {
                order_number: order.order_number.clone(),
                motion_type: order.motion_type.clone(),
                recipient: order.recipient_email.clone(),
                documents: deliverable_documents(order),
            });
        } else {
            order
                .status
                .validate_transition(OrderStatus::CancelledSystem)?;
            order.status = OrderStatus::CancelledSystem;
            self.store.commit_order(order)?;
            self.events.emit(EngineEvent::OrderCancelled {
                order_number: order.order_number.clone(),
                refund_suggested_cents: order.amount_paid_cents,
                full_refund: true,
            });
        }
        Ok(())
    }

    fn advance(&self, order: &mut Order, phase: PhaseCode) -> Result<PhaseOutcome, EngineError> {
        match phase.next() {
            Some(next) => {
                order.current_phase = Some(next);
                self.store.commit_order(order)?;
                Ok(PhaseOutcome::Advanced { next })
            }
            None => {
                order
                    .status
                    .validate_transition(OrderStatus::AwaitingApproval)?;
                order.status = OrderStatus::AwaitingApproval;
                self.store.commit_order(order)?;
                self.events.emit(EngineEvent::DocumentsReady {
                    order_number: order.order_number.clone(),
                    motion_type: order.motion_type.clone(),
                    recipient: order.recipient_email.clone(),
                    documents: deliverable_documents(order),
                });
                info!(order = %order.order_number, "pipeline complete, awaiting approval");
                Ok(PhaseOutcome::CheckpointReached)
            }
        }
    }
}

fn deliverable_documents(order: &Order) -> Vec<String> {
    vec![
        format!("{}-motion.pdf", order.order_number),
        format!("{}-supporting-memorandum.pdf", order.order_number),
    ]
}

fn build_prompt(order: &Order, phase: PhaseCode) -> String {
    format!(
        "Order {number}\nMotion type: {motion}\nPhase {code}: {name}\nRevision cycle: {cycle}\n",
        number = order.order_number,
        motion = order.motion_type,
        code = phase.code(),
        name = phase.name(),
        cycle = order.revision_count,
    )
}
