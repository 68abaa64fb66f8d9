//! Aegis-Orchestrator: Durable Workflow Runtime
//!
//! Graph-based agent workflows:
//! - [`graph`] — nodes (`START/END/AGENT/TOOL/ROUTER/HUMAN`) and normal or
//!   conditional edges
//! - [`state`] — the opaque JSON workflow state with its canonical hash
//! - [`checkpoint`] — append-only checkpoints (in-memory and Postgres)
//! - [`executor`] — the run loop: execute, checkpoint, route, bounded by
//!   `max_steps`; resume and replay from stored checkpoints
//! - [`killswitch`] — per-agent-type pause/resume gating every node
//! - [`tools`] — the explicit tool registry agents call through
//!
//! Unexpected node failures become terminal error states, never process
//! crashes. Checkpoints are strictly ordered per execution.

pub mod checkpoint;
pub mod executor;
pub mod graph;
pub mod killswitch;
pub mod state;
pub mod tools;

pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
#[cfg(feature = "postgres")]
pub use checkpoint::postgres::PgCheckpointStore;
pub use executor::{ExecutionStatus, WorkflowExecution, WorkflowRunner};
pub use graph::{EdgeDef, Node, NodeHandler, NodeKind, WorkflowGraph};
pub use killswitch::{AgentControl, AgentStatus, KillSwitch};
pub use state::WorkflowState;
pub use tools::{ToolDescriptor, ToolError, ToolRegistry};

use thiserror::Error;

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("conditional edge returned unknown target: {0}")]
    UnknownTarget(String),

    #[error("graph has no outgoing edge from {0}")]
    NoRoute(String),

    #[error("checkpoint state hash mismatch for execution {execution_id} at step {step}")]
    CheckpointIntegrity { execution_id: String, step: u32 },

    #[error("no checkpoint found for execution {0}")]
    NoCheckpoint(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("checkpoint store unavailable: {0}")]
    Store(String),

    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
