//! The workflow run loop.
//!
//! From `start`: execute the node's handler (failures become state errors
//! and a transition to `end`), append to history, checkpoint, route to the
//! next node, until `end` or `max_steps`. Every node tagged with an agent
//! type is gated by the kill switch first.
//!
//! Resume fetches the latest checkpoint, verifies its state hash and
//! continues at the node after the checkpointed one. Replay from an earlier
//! step rehydrates state from the stored blob the same way.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::graph::WorkflowGraph;
use crate::killswitch::KillSwitch;
use crate::state::WorkflowState;
use crate::OrchestratorError;

/// Default hard cap on node transitions.
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

/// A registered workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub tenant_id: String,
    pub status: ExecutionStatus,
    pub current_node: String,
    pub step_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Runs workflow graphs with checkpointing, kill-switch gating and replay.
pub struct WorkflowRunner {
    checkpoints: Arc<dyn CheckpointStore>,
    kill_switch: Arc<KillSwitch>,
    executions: RwLock<HashMap<String, WorkflowExecution>>,
    max_steps: u32,
}

impl WorkflowRunner {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, kill_switch: Arc<KillSwitch>) -> Self {
        Self {
            checkpoints,
            kill_switch,
            executions: RwLock::new(HashMap::new()),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Start a fresh execution of `graph` from `start`.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        tenant_id: &str,
        mut state: WorkflowState,
    ) -> Result<(WorkflowExecution, WorkflowState), OrchestratorError> {
        let execution_id = format!("exec-{}", Uuid::new_v4().simple());
        state.current_node = "start".to_string();
        state.tenant_id.get_or_insert_with(|| tenant_id.to_string());

        self.executions.write().insert(
            execution_id.clone(),
            WorkflowExecution {
                id: execution_id.clone(),
                workflow_id: graph.name.clone(),
                tenant_id: tenant_id.to_string(),
                status: ExecutionStatus::Running,
                current_node: "start".to_string(),
                step_number: 0,
                started_at: Utc::now(),
                finished_at: None,
            },
        );

        let state = self
            .drive(graph, &execution_id, tenant_id, state, 0)
            .await?;
        let execution = self
            .executions
            .read()
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.clone()))?;
        Ok((execution, state))
    }

    /// Resume an interrupted execution from its latest checkpoint.
    pub async fn resume(
        &self,
        graph: &WorkflowGraph,
        execution_id: &str,
    ) -> Result<WorkflowState, OrchestratorError> {
        let checkpoint = self
            .checkpoints
            .latest(execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::NoCheckpoint(execution_id.to_string()))?;
        self.replay_from(graph, execution_id, checkpoint).await
    }

    /// Replay from a specific step (the checkpoint at `from_step`, or the
    /// latest one at or before it).
    pub async fn replay(
        &self,
        graph: &WorkflowGraph,
        execution_id: &str,
        from_step: u32,
    ) -> Result<WorkflowState, OrchestratorError> {
        let checkpoints = self.checkpoints.list(execution_id).await?;
        let checkpoint = checkpoints
            .into_iter()
            .filter(|c| c.step_number <= from_step)
            .next_back()
            .ok_or_else(|| OrchestratorError::NoCheckpoint(execution_id.to_string()))?;
        self.replay_from(graph, execution_id, checkpoint).await
    }

    async fn replay_from(
        &self,
        graph: &WorkflowGraph,
        execution_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<WorkflowState, OrchestratorError> {
        checkpoint.verify()?;

        let mut state = checkpoint.state.clone();
        // The checkpointed node already ran; route to the node after it
        let next = graph.next_node(&checkpoint.node_id, &state)?;
        state.current_node = next;

        tracing::info!(
            execution_id = %execution_id,
            from_step = checkpoint.step_number,
            resume_at = %state.current_node,
            "Resuming from checkpoint"
        );

        self.executions
            .write()
            .entry(execution_id.to_string())
            .or_insert_with(|| WorkflowExecution {
                id: execution_id.to_string(),
                workflow_id: checkpoint.workflow_id.clone(),
                tenant_id: checkpoint.tenant_id.clone(),
                status: ExecutionStatus::Running,
                current_node: state.current_node.clone(),
                step_number: checkpoint.step_number,
                started_at: checkpoint.created_at,
                finished_at: None,
            })
            .status = ExecutionStatus::Running;

        self.drive(
            graph,
            execution_id,
            &checkpoint.tenant_id.clone(),
            state,
            checkpoint.step_number + 1,
        )
        .await
    }

    /// The core loop. `step` is the next step number to checkpoint.
    async fn drive(
        &self,
        graph: &WorkflowGraph,
        execution_id: &str,
        tenant_id: &str,
        mut state: WorkflowState,
        mut step: u32,
    ) -> Result<WorkflowState, OrchestratorError> {
        while state.current_node != "end" && step < self.max_steps {
            let node_name = state.current_node.clone();
            let Some(node) = graph.node(&node_name) else {
                state.errors.push(format!("unknown node: {node_name}"));
                self.finish(execution_id, ExecutionStatus::Failed, &node_name, step);
                return Ok(state);
            };

            // Kill-switch gate
            if let Some(agent_type) = &node.agent_type {
                if !self.kill_switch.is_active(agent_type) {
                    state.errors.push(format!("paused: agent type {agent_type}"));
                    state.current_node = "end".to_string();
                    self.finish(execution_id, ExecutionStatus::Paused, "end", step);
                    tracing::warn!(
                        execution_id = %execution_id,
                        agent_type = %agent_type,
                        "Execution halted by kill switch"
                    );
                    return Ok(state);
                }
            }

            // Execute
            if let Some(handler) = &node.handler {
                match handler.run(state.clone()).await {
                    Ok(next_state) => state = next_state,
                    Err(error) => {
                        tracing::error!(
                            execution_id = %execution_id,
                            node = %node_name,
                            error = %error,
                            "Node execution failed"
                        );
                        state.errors.push(format!("node {node_name} failed: {error}"));
                        state.history.push(node_name.clone());
                        state.current_node = "end".to_string();
                        let checkpoint = Checkpoint::capture(
                            execution_id,
                            &graph.name,
                            tenant_id,
                            &state,
                            &node_name,
                            step,
                        )?;
                        self.checkpoints.save(checkpoint).await?;
                        self.finish(execution_id, ExecutionStatus::Failed, "end", step);
                        return Ok(state);
                    }
                }
            }

            state.history.push(node_name.clone());

            // Checkpoint per transition
            let checkpoint = Checkpoint::capture(
                execution_id,
                &graph.name,
                tenant_id,
                &state,
                &node_name,
                step,
            )?;
            self.checkpoints.save(checkpoint).await?;
            self.update_progress(execution_id, &node_name, step);

            // Route
            match graph.next_node(&node_name, &state) {
                Ok(next) => state.current_node = next,
                Err(error) => {
                    state.errors.push(error.to_string());
                    state.current_node = "end".to_string();
                    self.finish(execution_id, ExecutionStatus::Failed, "end", step);
                    return Ok(state);
                }
            }

            step += 1;
        }

        if state.current_node == "end" {
            self.finish(execution_id, ExecutionStatus::Completed, "end", step);
        } else {
            state
                .errors
                .push(format!("max steps ({}) reached", self.max_steps));
            self.finish(execution_id, ExecutionStatus::Failed, &state.current_node.clone(), step);
        }
        Ok(state)
    }

    fn update_progress(&self, execution_id: &str, node: &str, step: u32) {
        if let Some(execution) = self.executions.write().get_mut(execution_id) {
            execution.current_node = node.to_string();
            execution.step_number = step;
        }
    }

    fn finish(&self, execution_id: &str, status: ExecutionStatus, node: &str, step: u32) {
        if let Some(execution) = self.executions.write().get_mut(execution_id) {
            execution.status = status;
            execution.current_node = node.to_string();
            execution.step_number = step;
            execution.finished_at = Some(Utc::now());
        }
    }

    /// Execution record by id.
    pub fn execution(&self, execution_id: &str) -> Option<WorkflowExecution> {
        self.executions.read().get(execution_id).cloned()
    }
}
