//! Built-in workflow definitions.
//!
//! The standard clinical graph: gather context → analyze → route → either
//! human review or response generation. Real deployments register richer
//! graphs; this one backs the CLI `replay` verb and the smoke tests.

use aegis_orchestrator::{NodeKind, WorkflowGraph};

/// Node the router sends low-confidence runs to.
pub const HUMAN_REVIEW: &str = "human_review";

/// Build and compile the standard clinical agent graph.
pub fn clinical_graph() -> WorkflowGraph {
    let mut graph = WorkflowGraph::new("clinical_agent");

    graph.add_node_fn("gather_context", NodeKind::Agent, |mut state| {
        state.set_context("gathered", true);
        state.add_message("system", "patient context gathered");
        Ok(state)
    });
    graph.set_agent_type("gather_context", "clinical");

    graph.add_node_fn("analyze", NodeKind::Agent, |mut state| {
        state.set_context("analyzed", true);
        state.add_message("assistant", "analysis complete");
        Ok(state)
    });
    graph.set_agent_type("analyze", "clinical");

    graph.add_node_fn(HUMAN_REVIEW, NodeKind::Human, |mut state| {
        state.add_message("system", "queued for human review");
        Ok(state)
    });

    graph.add_node_fn("generate_response", NodeKind::Agent, |mut state| {
        state.add_message("assistant", "response generated from analysis");
        Ok(state)
    });

    graph.add_edge("start", "gather_context");
    graph.add_edge("gather_context", "analyze");
    graph.add_conditional_edge("analyze", |state| {
        if state.context_bool("needs_human") {
            HUMAN_REVIEW.to_string()
        } else {
            "generate_response".to_string()
        }
    });
    graph.add_edge(HUMAN_REVIEW, "generate_response");
    graph.add_edge("generate_response", "end");

    graph.compile().expect("clinical graph is well-formed");
    graph
}
