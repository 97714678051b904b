//! Petgraph view of a workflow descriptor
//!
//! States become nodes and transitions become edges. The analysis is purely
//! informational: cycles are legal in a state machine and unreachable or
//! terminal states are reported, never rejected.

use crate::workflow::types::WorkflowDescriptor;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::Serialize;
use std::collections::HashMap;

/// Structural facts about a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphAnalysis {
    /// States without outgoing transitions, in declared order
    pub terminal_states: Vec<String>,
    /// States not reachable from the initial state, in declared order
    pub unreachable_states: Vec<String>,
    pub has_cycles: bool,
    /// States that sit on at least one cycle, in declared order
    pub cyclic_states: Vec<String>,
}

/// Directed state graph of one descriptor
#[derive(Debug)]
pub struct WorkflowGraph {
    /// Node weight is the state name, edge weight the transition name
    graph: DiGraph<String, String>,
    state_to_index: HashMap<String, NodeIndex>,
    initial_state: String,
}

impl WorkflowGraph {
    /// Build the graph; transitions to undeclared states are skipped
    pub fn build(descriptor: &WorkflowDescriptor) -> Self {
        let mut graph = DiGraph::new();
        let mut state_to_index = HashMap::new();

        for name in descriptor.states.keys() {
            state_to_index
                .entry(name.to_string())
                .or_insert_with(|| graph.add_node(name.to_string()));
        }

        for (from, state) in descriptor.states.iter() {
            let from_index = state_to_index[from];
            for (name, transition) in state.transitions.iter() {
                match state_to_index.get(&transition.next) {
                    Some(&to_index) => {
                        graph.add_edge(from_index, to_index, name.to_string());
                    }
                    None => tracing::debug!(
                        "Skipping edge {} --{}--> {} (unknown target)",
                        from,
                        name,
                        transition.next
                    ),
                }
            }
        }

        Self {
            graph,
            state_to_index,
            initial_state: descriptor.initial_state.clone(),
        }
    }

    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn transition_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn analyze(&self) -> GraphAnalysis {
        let mut reachable = vec![false; self.graph.node_count()];
        if let Some(&start) = self.state_to_index.get(&self.initial_state) {
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(index) = dfs.next(&self.graph) {
                reachable[index.index()] = true;
            }
        }

        let mut on_cycle = vec![false; self.graph.node_count()];
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&index| self.graph.contains_edge(index, index));
            if cyclic {
                for index in component {
                    on_cycle[index.index()] = true;
                }
            }
        }

        // Node indices follow declaration order.
        let collect = |flags: &[bool], wanted: bool| -> Vec<String> {
            self.graph
                .node_indices()
                .filter(|index| flags[index.index()] == wanted)
                .map(|index| self.graph[index].clone())
                .collect()
        };

        let terminal_states = self
            .graph
            .node_indices()
            .filter(|&index| self.graph.neighbors(index).next().is_none())
            .map(|index| self.graph[index].clone())
            .collect();
        let cyclic_states = collect(&on_cycle, true);

        GraphAnalysis {
            terminal_states,
            unreachable_states: collect(&reachable, false),
            has_cycles: !cyclic_states.is_empty(),
            cyclic_states,
        }
    }
}
