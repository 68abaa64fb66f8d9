//! Workflow graph definition.
//!
//! A workflow is a directed graph with fixed `start` and `end` nodes.
//! Edges are either normal (`from → to`) or conditional (`from` plus a
//! routing function over the live state that returns the target node name).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::WorkflowState;
use crate::OrchestratorError;

/// Node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    End,
    Agent,
    Tool,
    Router,
    Human,
}

/// A node's work function. Failures are strings; the executor converts
/// them into terminal error states.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, String>;
}

/// Adapter for synchronous state transforms.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(WorkflowState) -> Result<WorkflowState, String> + Send + Sync,
{
    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, String> {
        (self.0)(state)
    }
}

/// A graph node.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub handler: Option<Arc<dyn NodeHandler>>,
    pub description: String,
    /// Agent type gated by the kill switch, when set
    pub agent_type: Option<String>,
}

type ConditionFn = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// A graph edge.
#[derive(Clone)]
pub enum EdgeDef {
    Normal { from: String, to: String },
    Conditional { from: String, condition: ConditionFn },
}

impl EdgeDef {
    fn from_node(&self) -> &str {
        match self {
            Self::Normal { from, .. } | Self::Conditional { from, .. } => from,
        }
    }
}

/// A compiled workflow graph.
pub struct WorkflowGraph {
    pub name: String,
    nodes: HashMap<String, Node>,
    edges: Vec<EdgeDef>,
    compiled: bool,
}

impl WorkflowGraph {
    /// New graph with `start` and `end` pre-registered.
    pub fn new(name: impl Into<String>) -> Self {
        let mut graph = Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            compiled: false,
        };
        graph.add_node("start", NodeKind::Start, None);
        graph.add_node("end", NodeKind::End, None);
        graph
    }

    /// Add a node.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        handler: Option<Arc<dyn NodeHandler>>,
    ) -> &mut Self {
        let name = name.into();
        self.nodes.insert(
            name.clone(),
            Node {
                name,
                kind,
                handler,
                description: String::new(),
                agent_type: None,
            },
        );
        self.compiled = false;
        self
    }

    /// Add a node from a synchronous transform.
    pub fn add_node_fn<F>(&mut self, name: impl Into<String>, kind: NodeKind, f: F) -> &mut Self
    where
        F: Fn(WorkflowState) -> Result<WorkflowState, String> + Send + Sync + 'static,
    {
        self.add_node(name, kind, Some(Arc::new(FnHandler(f))))
    }

    /// Tag a node with the agent type the kill switch gates.
    pub fn set_agent_type(&mut self, node: &str, agent_type: impl Into<String>) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(node) {
            n.agent_type = Some(agent_type.into());
        }
        self
    }

    /// Add a normal edge.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push(EdgeDef::Normal {
            from: from.into(),
            to: to.into(),
        });
        self.compiled = false;
        self
    }

    /// Add a conditional edge; `condition` returns the target node name.
    pub fn add_conditional_edge<F>(&mut self, from: impl Into<String>, condition: F) -> &mut Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        self.edges.push(EdgeDef::Conditional {
            from: from.into(),
            condition: Arc::new(condition),
        });
        self.compiled = false;
        self
    }

    /// Validate: every normal edge references known nodes.
    pub fn compile(&mut self) -> Result<(), OrchestratorError> {
        for edge in &self.edges {
            if !self.nodes.contains_key(edge.from_node()) {
                return Err(OrchestratorError::UnknownNode(edge.from_node().to_string()));
            }
            if let EdgeDef::Normal { to, .. } = edge {
                if !self.nodes.contains_key(to) {
                    return Err(OrchestratorError::UnknownNode(to.clone()));
                }
            }
        }
        self.compiled = true;
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Next node from `current`: first matching outgoing edge. Conditional
    /// edges consult the live state; an unknown target is a terminal error.
    pub fn next_node(
        &self,
        current: &str,
        state: &WorkflowState,
    ) -> Result<String, OrchestratorError> {
        for edge in &self.edges {
            if edge.from_node() != current {
                continue;
            }
            return match edge {
                EdgeDef::Normal { to, .. } => Ok(to.clone()),
                EdgeDef::Conditional { condition, .. } => {
                    let target = condition(state);
                    if self.nodes.contains_key(&target) {
                        Ok(target)
                    } else {
                        Err(OrchestratorError::UnknownTarget(target))
                    }
                }
            };
        }
        Err(OrchestratorError::NoRoute(current.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_validates_edges() {
        let mut graph = WorkflowGraph::new("g");
        graph.add_edge("start", "missing");
        assert!(graph.compile().is_err());

        let mut ok = WorkflowGraph::new("g");
        ok.add_node_fn("a", NodeKind::Agent, Ok);
        ok.add_edge("start", "a");
        ok.add_edge("a", "end");
        assert!(ok.compile().is_ok());
    }

    #[test]
    fn test_conditional_routing() {
        let mut graph = WorkflowGraph::new("g");
        graph.add_node_fn("review", NodeKind::Human, Ok);
        graph.add_node_fn("respond", NodeKind::Agent, Ok);
        graph.add_conditional_edge("start", |state| {
            if state.context_bool("needs_human") {
                "review".to_string()
            } else {
                "respond".to_string()
            }
        });
        graph.compile().unwrap();

        let mut state = WorkflowState::new();
        assert_eq!(graph.next_node("start", &state).unwrap(), "respond");

        state.set_context("needs_human", true);
        assert_eq!(graph.next_node("start", &state).unwrap(), "review");
    }

    #[test]
    fn test_unknown_conditional_target_errors() {
        let mut graph = WorkflowGraph::new("g");
        graph.add_conditional_edge("start", |_| "nowhere".to_string());
        graph.compile().unwrap();

        let err = graph.next_node("start", &WorkflowState::new()).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownTarget(t) if t == "nowhere"));
    }

    #[test]
    fn test_no_route() {
        let graph = WorkflowGraph::new("g");
        assert!(matches!(
            graph.next_node("start", &WorkflowState::new()),
            Err(OrchestratorError::NoRoute(_))
        ));
    }
}
