//! End-to-end engine tests: a scripted model client drives real orders
//! through the lifecycle against an in-memory store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use gavel::config::EngineConfig;
use gavel::engine::{
    EngineEvent, MemorySink, ModelCallError, ModelClient, ModelRequest, ModelResponse,
    OrderCommands, PhaseDriver, PhaseOutcome, ProtocolExitReason,
};
use gavel::errors::EngineError;
use gavel::order::{HoldReason, Order, OrderStatus};
use gavel::phase::PhaseCode;
use gavel::store::{EngineStore, ExecutionStatus};
use gavel::tier::{ExecutionTier, PricingTier};

/// Model stub that replays a script, then falls back to a default
/// response.
struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelResponse, ModelCallError>>>,
    fallback: ModelResponse,
}

impl ScriptedModel {
    fn always_good() -> Self {
        Self::with_script(vec![])
    }

    fn with_script(script: Vec<Result<ModelResponse, ModelCallError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: good_response(),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ModelCallError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

fn good_response() -> ModelResponse {
    ModelResponse {
        output: "The mover is entitled to judgment under La. C.C.P. Art. 966. \
                 See Anding v. Smith, 123 So.3d 456, 460."
            .to_string(),
        input_tokens: 10_000,
        output_tokens: 2_000,
        quality_score: Some(0.95),
    }
}

struct Harness {
    store: Arc<EngineStore>,
    driver: PhaseDriver,
    commands: OrderCommands,
    events: Arc<MemorySink>,
}

fn harness(model: ScriptedModel) -> Harness {
    let store = Arc::new(EngineStore::open_in_memory().unwrap());
    let config = Arc::new(EngineConfig::default());
    let events = Arc::new(MemorySink::new());
    let driver = PhaseDriver::new(
        store.clone(),
        config.clone(),
        Arc::new(model),
        events.clone(),
    );
    let commands = OrderCommands::new(store.clone(), config, events.clone());
    Harness {
        store,
        driver,
        commands,
        events,
    }
}

fn new_order(store: &EngineStore) -> Order {
    let order = Order::new_intake(
        "MG-2026-0142",
        "motion_summary_judgment",
        PricingTier::Standard,
        ExecutionTier::Standard,
        89_500,
        "client@example.com",
    );
    store.insert_order(&order).unwrap();
    order
}

/// An order already mid-pipeline, for tests that start deep in.
fn processing_order_at(store: &EngineStore, phase: PhaseCode) -> Order {
    let mut order = Order::new_intake(
        "MG-2026-0143",
        "motion_summary_judgment",
        PricingTier::Standard,
        ExecutionTier::Standard,
        89_500,
        "client@example.com",
    );
    order.status = OrderStatus::Processing;
    order.current_phase = Some(phase);
    store.insert_order(&order).unwrap();
    order
}

#[tokio::test]
async fn full_pipeline_runs_to_checkpoint_and_completes() {
    let h = harness(ScriptedModel::always_good());
    let order = new_order(&h.store);

    let order = h.commands.begin_processing(order.id, 0).unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.current_phase, Some(PhaseCode::IntakeReview));

    let mut outcome = PhaseOutcome::Skipped {
        status: OrderStatus::Intake,
    };
    for _ in 0..PhaseCode::ALL.len() {
        outcome = h.driver.run_phase(order.id).await.unwrap();
    }
    assert_eq!(outcome, PhaseOutcome::CheckpointReached);

    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingApproval);
    assert_eq!(order.current_phase, Some(PhaseCode::DeliveryPackage));

    // Every phase produced exactly one completed execution and one
    // primary ledger entry.
    let executions = h.store.phase_executions(order.id).unwrap();
    assert_eq!(executions.len(), 14);
    assert!(executions
        .iter()
        .all(|e| e.status == ExecutionStatus::Completed));
    let entries = h.store.cost_entries(order.id).unwrap();
    assert_eq!(entries.len(), 14);

    // Citation phases persisted their result sets.
    let results = h
        .store
        .citation_results(order.id, PhaseCode::ArgumentDraft)
        .unwrap()
        .unwrap();
    assert_eq!(results.statutory.len(), 1);
    assert_eq!(results.statutory[0].article, "966");
    assert_eq!(results.caselaw.len(), 1);
    assert_eq!(results.caselaw[0].pinpoints, vec![460]);
    assert!(h
        .store
        .citation_results(order.id, PhaseCode::IntakeReview)
        .unwrap()
        .is_none());

    // Checkpoint notification went out.
    let events = h.events.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::DocumentsReady { recipient, .. }
            if recipient == "client@example.com")));

    // Approval closes the order.
    let order = h
        .commands
        .approve_checkpoint(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn redelivered_step_is_idempotent() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::IntakeReview);

    // Simulate a crash after the execution finished but before the phase
    // pointer moved: the completed row exists, the order still points at I.
    let exec_id = h
        .store
        .insert_phase_execution(order.id, PhaseCode::IntakeReview, 1)
        .unwrap();
    h.store
        .finish_phase_execution(exec_id, ExecutionStatus::Completed, Some(0.95), None)
        .unwrap();

    let outcome = h.driver.run_phase(order.id).await.unwrap();
    assert_eq!(
        outcome,
        PhaseOutcome::Advanced {
            next: PhaseCode::ConflictScreen
        }
    );

    // No duplicate execution row, no cost entry from the re-delivery.
    assert_eq!(h.store.phase_executions(order.id).unwrap().len(), 1);
    assert!(h.store.cost_entries(order.id).unwrap().is_empty());
}

#[tokio::test]
async fn hard_cap_breach_without_deliverable_cancels_with_full_refund() {
    // One call expensive enough to blow the standard hard cap (2250c).
    let expensive = ModelResponse {
        output: "intake summary".to_string(),
        input_tokens: 30_000_000,
        output_tokens: 0,
        quality_score: Some(0.95),
    };
    let h = harness(ScriptedModel::with_script(vec![Ok(expensive)]));
    let order = processing_order_at(&h.store, PhaseCode::IntakeReview);

    let outcome = h.driver.run_phase(order.id).await.unwrap();
    assert_eq!(
        outcome,
        PhaseOutcome::ProtocolExited {
            reason: ProtocolExitReason::HardCostCapBreached
        }
    );

    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::CancelledSystem);
    assert!(order.cost_cap_triggered);

    // The in-flight call was billed before the exit finalized.
    assert_eq!(h.store.cost_entries(order.id).unwrap().len(), 1);

    let events = h.events.events();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::ProtocolExit {
            deliverable_exists: false,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::OrderCancelled {
            full_refund: true,
            refund_suggested_cents: 89_500,
            ..
        }
    )));
}

#[tokio::test]
async fn exhausted_revisions_with_deliverable_reach_review_checkpoint() {
    let weak = ModelResponse {
        quality_score: Some(0.5),
        ..good_response()
    };
    let h = harness(ScriptedModel::with_script(vec![
        Ok(weak.clone()),
        Ok(weak.clone()),
        Ok(weak),
    ]));
    let order = processing_order_at(&h.store, PhaseCode::ArgumentDraft);

    // Standard tier allows 2 revision loops.
    assert_eq!(
        h.driver.run_phase(order.id).await.unwrap(),
        PhaseOutcome::RevisionScheduled { revision_count: 1 }
    );
    assert_eq!(
        h.driver.run_phase(order.id).await.unwrap(),
        PhaseOutcome::RevisionScheduled { revision_count: 2 }
    );
    assert_eq!(
        h.driver.run_phase(order.id).await.unwrap(),
        PhaseOutcome::ProtocolExited {
            reason: ProtocolExitReason::RevisionLoopsExhausted
        }
    );

    // A draft exists, so the exit lands on the human-review checkpoint.
    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingApproval);

    // Further change requests are refused; approval still works.
    let err = h
        .commands
        .request_changes(order.id, order.status_version)
        .unwrap_err();
    assert!(matches!(err, EngineError::RevisionBudgetExhausted { .. }));
    let order = h
        .commands
        .approve_checkpoint(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn revision_request_loops_back_through_processing() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::DeliveryPackage);

    let outcome = h.driver.run_phase(order.id).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::CheckpointReached);

    let order = h.store.get_order(order.id).unwrap();
    let order = h
        .commands
        .request_changes(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::RevisionRequested);

    let order = h
        .commands
        .resume_revision(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.revision_count, 1);
    assert_eq!(order.current_phase, Some(PhaseCode::RevisionCycle));
}

#[tokio::test]
async fn capacity_backpressure_parks_and_resumes() {
    let h = harness(ScriptedModel::with_script(vec![Err(
        ModelCallError::CapacityExhausted,
    )]));
    let order = processing_order_at(&h.store, PhaseCode::IntakeReview);

    let outcome = h.driver.run_phase(order.id).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::DeferredForCapacity);

    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingModelCapacity);

    let order = h
        .commands
        .resume_from_capacity(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);

    // The deferred attempt produced no ledger entry.
    assert!(h.store.cost_entries(order.id).unwrap().is_empty());
}

#[tokio::test]
async fn failed_call_bills_retry_and_success_bills_primary() {
    let h = harness(ScriptedModel::with_script(vec![
        Err(ModelCallError::Failed {
            message: "upstream 500".to_string(),
            input_tokens: 5_000,
            output_tokens: 0,
        }),
        Ok(good_response()),
    ]));
    let order = processing_order_at(&h.store, PhaseCode::IntakeReview);

    let outcome = h.driver.run_phase(order.id).await.unwrap();
    assert_eq!(
        outcome,
        PhaseOutcome::Advanced {
            next: PhaseCode::ConflictScreen
        }
    );

    let entries = h.store.cost_entries(order.id).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].source.as_str(), "retry");
    assert_eq!(entries[0].attempt, 1);
    assert_eq!(entries[1].source.as_str(), "primary");
    assert_eq!(entries[1].attempt, 2);

    let totals = h.store.order_cost_totals(order.id).unwrap();
    assert!(totals.retry_overhead_percent().is_some());
}

#[tokio::test]
async fn persistent_failure_exhausts_attempts() {
    let failure = || {
        Err(ModelCallError::Failed {
            message: "upstream 500".to_string(),
            input_tokens: 1_000,
            output_tokens: 0,
        })
    };
    let h = harness(ScriptedModel::with_script(vec![
        failure(),
        failure(),
        failure(),
    ]));
    let order = processing_order_at(&h.store, PhaseCode::IntakeReview);

    let err = h.driver.run_phase(order.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::ExternalCallFailure { attempts: 3, .. }
    ));

    // Every failed attempt still landed in the ledger as retry cost.
    let entries = h.store.cost_entries(order.id).unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.source.as_str() == "retry"));

    let executions = h.store.phase_executions(order.id).unwrap();
    assert_eq!(executions.last().unwrap().status, ExecutionStatus::Failed);

    // The order stays in processing for the scheduler to retry the step.
    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn stale_version_loses_the_race_exactly_once() {
    let h = harness(ScriptedModel::always_good());
    let order = new_order(&h.store);

    // Two actors hold the same observed version 0.
    let first = h.commands.begin_processing(order.id, 0).unwrap();
    assert_eq!(first.status_version, 1);

    let err = h.commands.begin_processing(order.id, 0).unwrap_err();
    assert!(matches!(err, EngineError::ConcurrencyConflict { .. }));

    // The version moved exactly once.
    let current = h.store.get_order(order.id).unwrap();
    assert_eq!(current.status_version, 1);
}

#[tokio::test]
async fn terminal_states_reject_commands() {
    let h = harness(ScriptedModel::always_good());
    let order = new_order(&h.store);
    let (order, _suggestion) = h.commands.cancel_order(order.id, 0).unwrap();
    assert_eq!(order.status, OrderStatus::CancelledUser);

    let err = h
        .commands
        .begin_processing(order.id, order.status_version)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancellation_mid_pipeline_suggests_partial_refund() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::EvidenceInventory);

    let (order, suggestion) = h
        .commands
        .cancel_order(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::CancelledUser);
    assert_eq!(suggestion.percentage, 75);
    assert_eq!(suggestion.amount_cents, 67_125);

    let events = h.events.events();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::OrderCancelled {
            full_refund: false,
            refund_suggested_cents: 67_125,
            ..
        }
    )));
}

#[tokio::test]
async fn hold_sweep_escalates_then_cancels() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::EvidenceInventory);

    let order = h
        .commands
        .place_hold(order.id, order.status_version, HoldReason::EvidenceGap)
        .unwrap();
    assert_eq!(order.status, OrderStatus::HoldPending);
    let expires_at = order.hold_expires_at.unwrap();

    // Nothing to do while the hold is fresh.
    let stats = h.driver.sweep_holds(Utc::now()).unwrap();
    assert_eq!(stats.escalated, 0);
    assert_eq!(stats.cancelled, 0);

    // Past the escalation window (3 of 7 days in): reminder fires once.
    let stats = h
        .driver
        .sweep_holds(expires_at - Duration::days(3))
        .unwrap();
    assert_eq!(stats.escalated, 1);
    let stats = h
        .driver
        .sweep_holds(expires_at - Duration::days(3))
        .unwrap();
    assert_eq!(stats.escalated, 0);

    // Past expiry: auto-cancel.
    let stats = h.driver.sweep_holds(expires_at + Duration::hours(1)).unwrap();
    assert_eq!(stats.cancelled, 1);

    let order = h.store.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::CancelledSystem);

    let events = h.events.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::HoldCreated { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::HoldEscalated { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::HoldExpired { .. })));
}

#[tokio::test]
async fn legal_hold_exempts_order_from_auto_cancel() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::EvidenceInventory);

    let order = h
        .commands
        .place_hold(order.id, order.status_version, HoldReason::EvidenceGap)
        .unwrap();
    let order = h
        .commands
        .set_legal_hold(order.id, order.status_version, true)
        .unwrap();
    let expires_at = order.hold_expires_at.unwrap();

    let stats = h.driver.sweep_holds(expires_at + Duration::days(1)).unwrap();
    assert_eq!(stats.cancelled, 0);
    assert_eq!(
        h.store.get_order(order.id).unwrap().status,
        OrderStatus::HoldPending
    );
}

#[tokio::test]
async fn upgrade_raises_execution_tier_without_stepping_down() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::ResearchPlan);

    let order = h
        .commands
        .request_upgrade(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::UpgradePending);

    let order = h
        .commands
        .complete_upgrade(order.id, order.status_version, PricingTier::Premium)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.paid_tier, PricingTier::Premium);
    assert_eq!(order.execution_tier, ExecutionTier::Premium);
}

#[tokio::test]
async fn dispute_resolves_to_refund() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::ResearchPlan);

    let order = h
        .commands
        .open_dispute(order.id, order.status_version)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Disputed);

    let order = h
        .commands
        .resolve_dispute(order.id, order.status_version, true)
        .unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
}

#[tokio::test]
async fn refund_override_requires_justification_for_deviation() {
    let h = harness(ScriptedModel::always_good());
    let order = processing_order_at(&h.store, PhaseCode::EvidenceInventory);

    let err = h
        .commands
        .override_refund(order.id, order.status_version, 89_500, "admin@firm", "ok")
        .unwrap_err();
    assert!(matches!(err, EngineError::JustificationTooShort { .. }));

    let record = h
        .commands
        .override_refund(
            order.id,
            order.status_version,
            89_500,
            "admin@firm",
            "goodwill full refund approved by the supervising partner",
        )
        .unwrap();
    assert!(record.deviated);
    assert_eq!(record.actual_cents, 89_500);
    assert_eq!(record.suggested_cents, 67_125);
}
