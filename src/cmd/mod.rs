//! CLI subcommand implementations.

pub mod extract;
pub mod refund;
pub mod registry;
