//! The orchestration engine: phase driver, command surface, collaborator
//! traits, and outbound events.
//!
//! Construction wires four pieces together — the store, the immutable
//! configuration, a [`model::ModelClient`], and an [`events::EventSink`] —
//! and the external durable scheduler drives [`driver::PhaseDriver`] one
//! idempotent step at a time.

pub mod commands;
pub mod driver;
pub mod events;
pub mod model;

pub use commands::OrderCommands;
pub use driver::{HoldSweepStats, PhaseDriver, PhaseOutcome};
pub use events::{EngineEvent, EventSink, MemorySink, NullSink, ProtocolExitReason};
pub use model::{ModelCallError, ModelClient, ModelRequest, ModelResponse};
