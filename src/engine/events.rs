//! Structured engine events for the notification/document collaborators.
//!
//! The engine emits these at lifecycle boundaries; rendering and delivery
//! (email templates, PDF assembly) are external. Events carry enough
//! context for a renderer to work without a database read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Why a Protocol-exit fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolExitReason {
    RevisionLoopsExhausted,
    HardCostCapBreached,
    OrderCeilingBreached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    DocumentsReady {
        order_number: String,
        motion_type: String,
        recipient: String,
        documents: Vec<String>,
    },
    HoldCreated {
        order_number: String,
        reason: String,
        expires_at: DateTime<Utc>,
    },
    HoldEscalated {
        order_number: String,
        expires_at: DateTime<Utc>,
    },
    HoldExpired {
        order_number: String,
    },
    ProtocolExit {
        order_number: String,
        reason: ProtocolExitReason,
        deliverable_exists: bool,
    },
    OrderCancelled {
        order_number: String,
        refund_suggested_cents: i64,
        full_refund: bool,
    },
    /// Asynchronous alert for a cost write that degraded to the UNKNOWN
    /// tier sentinel.
    CostTierUnknown {
        order_number: String,
        original_tag: String,
    },
    /// Soft-cap breach: flagged, execution continues.
    BudgetAlert {
        order_number: String,
        primary_cents: i64,
        soft_cap_cents: i64,
    },
}

/// Outbound event channel. Implementations must tolerate re-emission:
/// scheduler steps are at-least-once.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Drops every event. Useful for tooling that only needs state effects.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Buffers events in memory for assertions.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_snake_case_tags() {
        let event = EngineEvent::DocumentsReady {
            order_number: "MG-2026-0001".into(),
            motion_type: "motion_summary_judgment".into(),
            recipient: "client@example.com".into(),
            documents: vec!["motion.pdf".into(), "memo.pdf".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "documents_ready");
        assert_eq!(json["documents"][1], "memo.pdf");
    }

    #[test]
    fn test_memory_sink_buffers_in_order() {
        let sink = MemorySink::new();
        sink.emit(EngineEvent::HoldExpired {
            order_number: "MG-1".into(),
        });
        sink.emit(EngineEvent::OrderCancelled {
            order_number: "MG-1".into(),
            refund_suggested_cents: 85_000,
            full_refund: false,
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::HoldExpired { .. }));
    }
}
