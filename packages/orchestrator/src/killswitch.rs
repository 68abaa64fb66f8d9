//! Kill switch: per-agent-type pause/resume with scheduled auto-resume.
//!
//! `is_active` is consulted before every workflow node that invokes a named
//! agent; a paused agent sends the execution to `end` with a `paused`
//! error. `"all"` toggles a global flag. Scheduled resumes are applied
//! lazily on the next check.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agent-type status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
}

/// Control state for one agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentControl {
    pub agent_type: String,
    pub status: AgentStatus,
    pub paused_by: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    /// Auto-resume at this time, enforced lazily on the next check
    pub resume_after: Option<DateTime<Utc>>,
}

impl AgentControl {
    fn active(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            status: AgentStatus::Active,
            paused_by: None,
            paused_at: None,
            pause_reason: None,
            resume_after: None,
        }
    }
}

/// One pause/resume action, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlAction {
    pub action: String,
    pub agent_type: String,
    pub actor: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The kill switch.
pub struct KillSwitch {
    controls: RwLock<HashMap<String, AgentControl>>,
    global_pause: RwLock<bool>,
    actions: RwLock<Vec<ControlAction>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            controls: RwLock::new(HashMap::new()),
            global_pause: RwLock::new(false),
            actions: RwLock::new(Vec::new()),
        }
    }

    /// Pause an agent type (or `"all"`), optionally scheduling a resume.
    pub fn pause(
        &self,
        agent_type: &str,
        paused_by: &str,
        reason: Option<String>,
        resume_after: Option<DateTime<Utc>>,
    ) -> AgentControl {
        self.record("pause", agent_type, paused_by, reason.clone());

        if agent_type == "all" {
            *self.global_pause.write() = true;
            tracing::warn!(paused_by = %paused_by, "ALL AGENTS PAUSED");
            let mut control = AgentControl::active("all");
            control.status = AgentStatus::Paused;
            return control;
        }

        let mut controls = self.controls.write();
        let control = controls
            .entry(agent_type.to_string())
            .or_insert_with(|| AgentControl::active(agent_type));
        control.status = AgentStatus::Paused;
        control.paused_by = Some(paused_by.to_string());
        control.paused_at = Some(Utc::now());
        control.pause_reason = reason;
        control.resume_after = resume_after;

        tracing::info!(agent_type = %agent_type, paused_by = %paused_by, "Agent paused");
        control.clone()
    }

    /// Resume an agent type (or `"all"`).
    pub fn resume(&self, agent_type: &str, resumed_by: &str) -> AgentControl {
        self.record("resume", agent_type, resumed_by, None);

        if agent_type == "all" {
            *self.global_pause.write() = false;
            for control in self.controls.write().values_mut() {
                *control = AgentControl::active(&control.agent_type.clone());
            }
            tracing::info!(resumed_by = %resumed_by, "ALL AGENTS RESUMED");
            return AgentControl::active("all");
        }

        let mut controls = self.controls.write();
        let control = controls
            .entry(agent_type.to_string())
            .or_insert_with(|| AgentControl::active(agent_type));
        *control = AgentControl::active(agent_type);
        tracing::info!(agent_type = %agent_type, resumed_by = %resumed_by, "Agent resumed");
        control.clone()
    }

    /// Whether an agent type may run right now. Applies any due scheduled
    /// resume before answering.
    pub fn is_active(&self, agent_type: &str) -> bool {
        if *self.global_pause.read() {
            return false;
        }

        let mut controls = self.controls.write();
        let Some(control) = controls.get_mut(agent_type) else {
            return true;
        };
        if control.status == AgentStatus::Paused {
            if let Some(resume_after) = control.resume_after {
                if Utc::now() >= resume_after {
                    *control = AgentControl::active(agent_type);
                    tracing::info!(agent_type = %agent_type, "Scheduled resume applied");
                    return true;
                }
            }
            return false;
        }
        true
    }

    /// Control state for every agent type that has ever been touched.
    pub fn status(&self) -> Vec<AgentControl> {
        let mut controls: Vec<AgentControl> = self.controls.read().values().cloned().collect();
        controls.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
        controls
    }

    /// The pause/resume action trail.
    pub fn actions(&self) -> Vec<ControlAction> {
        self.actions.read().clone()
    }

    fn record(&self, action: &str, agent_type: &str, actor: &str, reason: Option<String>) {
        self.actions.write().push(ControlAction {
            action: action.to_string(),
            agent_type: agent_type.to_string(),
            actor: actor.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pause_and_resume() {
        let ks = KillSwitch::new();
        assert!(ks.is_active("triage"));

        ks.pause("triage", "admin", Some("maintenance window".into()), None);
        assert!(!ks.is_active("triage"));
        assert!(ks.is_active("care-gap"));

        ks.resume("triage", "admin");
        assert!(ks.is_active("triage"));
    }

    #[test]
    fn test_global_pause() {
        let ks = KillSwitch::new();
        ks.pause("all", "admin", Some("incident".into()), None);
        assert!(!ks.is_active("triage"));
        assert!(!ks.is_active("anything"));

        ks.resume("all", "admin");
        assert!(ks.is_active("triage"));
    }

    #[test]
    fn test_scheduled_resume_is_lazy() {
        let ks = KillSwitch::new();
        ks.pause(
            "triage",
            "admin",
            None,
            Some(Utc::now() - Duration::seconds(1)),
        );
        // Already past the resume time; the next check reactivates
        assert!(ks.is_active("triage"));
        assert_eq!(ks.status()[0].status, AgentStatus::Active);

        ks.pause(
            "triage",
            "admin",
            None,
            Some(Utc::now() + Duration::hours(1)),
        );
        assert!(!ks.is_active("triage"));
    }

    #[test]
    fn test_action_trail() {
        let ks = KillSwitch::new();
        ks.pause("triage", "admin", Some("why".into()), None);
        ks.resume("triage", "admin");

        let actions = ks.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, "pause");
        assert_eq!(actions[1].action, "resume");
    }
}
