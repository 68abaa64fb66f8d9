//! Checkpoint records and stores.
//!
//! Checkpoints are append-only and strictly ordered per execution
//! (`step_number` monotonic). Cleanup is TTL-gated and always keeps the
//! latest N per execution.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::WorkflowState;
use crate::OrchestratorError;

/// A durable snapshot of workflow state at a node boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub execution_id: String,
    pub workflow_id: String,
    pub tenant_id: String,
    pub state: WorkflowState,
    pub state_hash: String,
    pub node_id: String,
    pub step_number: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Build a checkpoint, computing the state hash.
    pub fn capture(
        execution_id: &str,
        workflow_id: &str,
        tenant_id: &str,
        state: &WorkflowState,
        node_id: &str,
        step_number: u32,
    ) -> Result<Self, OrchestratorError> {
        Ok(Self {
            id: format!("checkpoint-{execution_id}-{step_number}"),
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            tenant_id: tenant_id.to_string(),
            state: state.clone(),
            state_hash: state.hash()?,
            node_id: node_id.to_string(),
            step_number,
            status: "active".to_string(),
            created_at: Utc::now(),
        })
    }

    /// Recompute and compare the state hash.
    pub fn verify(&self) -> Result<(), OrchestratorError> {
        let computed = self.state.hash()?;
        if computed == self.state_hash {
            Ok(())
        } else {
            Err(OrchestratorError::CheckpointIntegrity {
                execution_id: self.execution_id.clone(),
                step: self.step_number,
            })
        }
    }
}

/// Checkpoint persistence contract.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), OrchestratorError>;

    /// Latest checkpoint (highest step) for an execution.
    async fn latest(&self, execution_id: &str) -> Result<Option<Checkpoint>, OrchestratorError>;

    /// All checkpoints for an execution, step-ascending.
    async fn list(&self, execution_id: &str) -> Result<Vec<Checkpoint>, OrchestratorError>;

    /// Delete checkpoints older than `older_than_days`, always keeping the
    /// latest `keep_latest` per execution. Returns how many were removed.
    async fn cleanup(
        &self,
        older_than_days: i64,
        keep_latest: usize,
    ) -> Result<usize, OrchestratorError>;
}

/// In-memory store, the test and mock-mode default.
pub struct InMemoryCheckpointStore {
    by_execution: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            by_execution: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), OrchestratorError> {
        let mut store = self.by_execution.write();
        let list = store.entry(checkpoint.execution_id.clone()).or_default();
        list.push(checkpoint);
        list.sort_by_key(|c| c.step_number);
        Ok(())
    }

    async fn latest(&self, execution_id: &str) -> Result<Option<Checkpoint>, OrchestratorError> {
        Ok(self
            .by_execution
            .read()
            .get(execution_id)
            .and_then(|list| list.last().cloned()))
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<Checkpoint>, OrchestratorError> {
        Ok(self
            .by_execution
            .read()
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cleanup(
        &self,
        older_than_days: i64,
        keep_latest: usize,
    ) -> Result<usize, OrchestratorError> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let mut removed = 0;
        let mut store = self.by_execution.write();
        for list in store.values_mut() {
            let keep_from = list.len().saturating_sub(keep_latest);
            let mut index = 0;
            list.retain(|c| {
                let keep = index >= keep_from || c.created_at >= cutoff;
                index += 1;
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        Ok(removed)
    }
}

/// Postgres-backed store over the `workflow_checkpoints` table.
#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    /// Durable checkpoint store.
    pub struct PgCheckpointStore {
        pool: PgPool,
    }

    impl PgCheckpointStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Create the table and indexes if absent.
        pub async fn ensure_schema(&self) -> Result<(), OrchestratorError> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS workflow_checkpoints (
                    id VARCHAR(255) PRIMARY KEY,
                    execution_id VARCHAR(255) NOT NULL,
                    workflow_id VARCHAR(255) NOT NULL,
                    tenant_id VARCHAR(64) NOT NULL,
                    state JSONB NOT NULL,
                    state_hash VARCHAR(64) NOT NULL,
                    node_id VARCHAR(255),
                    step_number INTEGER NOT NULL,
                    status VARCHAR(32) DEFAULT 'active',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_checkpoints_execution \
                 ON workflow_checkpoints(execution_id, step_number)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_checkpoints_workflow \
                 ON workflow_checkpoints(workflow_id, created_at DESC)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            Ok(())
        }

        fn row_to_checkpoint(row: &sqlx::postgres::PgRow) -> Result<Checkpoint, OrchestratorError> {
            let state_value: serde_json::Value = row
                .try_get("state")
                .map_err(|e| OrchestratorError::Store(e.to_string()))?;
            Ok(Checkpoint {
                id: row.try_get("id").map_err(|e| OrchestratorError::Store(e.to_string()))?,
                execution_id: row
                    .try_get("execution_id")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
                workflow_id: row
                    .try_get("workflow_id")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
                tenant_id: row
                    .try_get("tenant_id")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
                state: serde_json::from_value(state_value)?,
                state_hash: row
                    .try_get("state_hash")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
                node_id: row
                    .try_get::<Option<String>, _>("node_id")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?
                    .unwrap_or_default(),
                step_number: row
                    .try_get::<i32, _>("step_number")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))? as u32,
                status: row
                    .try_get("status")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
                created_at: row
                    .try_get("created_at")
                    .map_err(|e| OrchestratorError::Store(e.to_string()))?,
            })
        }
    }

    #[async_trait]
    impl CheckpointStore for PgCheckpointStore {
        async fn save(&self, checkpoint: Checkpoint) -> Result<(), OrchestratorError> {
            let state = serde_json::to_value(&checkpoint.state)?;
            sqlx::query(
                r#"
                INSERT INTO workflow_checkpoints
                    (id, execution_id, workflow_id, tenant_id, state, state_hash,
                     node_id, step_number, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&checkpoint.id)
            .bind(&checkpoint.execution_id)
            .bind(&checkpoint.workflow_id)
            .bind(&checkpoint.tenant_id)
            .bind(state)
            .bind(&checkpoint.state_hash)
            .bind(&checkpoint.node_id)
            .bind(checkpoint.step_number as i32)
            .bind(&checkpoint.status)
            .bind(checkpoint.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
            Ok(())
        }

        async fn latest(&self, execution_id: &str) -> Result<Option<Checkpoint>, OrchestratorError> {
            let row = sqlx::query(
                "SELECT * FROM workflow_checkpoints WHERE execution_id = $1 \
                 ORDER BY step_number DESC LIMIT 1",
            )
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            row.as_ref().map(Self::row_to_checkpoint).transpose()
        }

        async fn list(&self, execution_id: &str) -> Result<Vec<Checkpoint>, OrchestratorError> {
            let rows = sqlx::query(
                "SELECT * FROM workflow_checkpoints WHERE execution_id = $1 \
                 ORDER BY step_number ASC",
            )
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            rows.iter().map(Self::row_to_checkpoint).collect()
        }

        async fn cleanup(
            &self,
            older_than_days: i64,
            keep_latest: usize,
        ) -> Result<usize, OrchestratorError> {
            let result = sqlx::query(
                r#"
                DELETE FROM workflow_checkpoints
                WHERE created_at < NOW() - ($1::float8 * INTERVAL '1 day')
                  AND id NOT IN (
                      SELECT id FROM (
                          SELECT id, ROW_NUMBER() OVER (
                              PARTITION BY execution_id ORDER BY step_number DESC
                          ) AS rn
                          FROM workflow_checkpoints
                      ) ranked
                      WHERE rn <= $2
                  )
                "#,
            )
            .bind(older_than_days as f64)
            .bind(keep_latest as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

            Ok(result.rows_affected() as usize)
        }
    }
}
