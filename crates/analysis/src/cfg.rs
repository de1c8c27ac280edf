//! Per-function control-flow graphs.
//!
//! Blocks become petgraph nodes and terminator successor edges become
//! directed edges, which makes reachability and edge-count questions
//! one-liners instead of hand-rolled walks.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use umbra_core::{BlockId, Function};

/// Builds the CFG of a function body. Returns the graph plus the
/// block-to-node mapping; an empty graph for declarations.
pub fn function_cfg(func: &Function) -> (DiGraph<BlockId, ()>, HashMap<BlockId, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    for block in func.block_ids() {
        nodes.insert(block, graph.add_node(block));
    }
    for block in func.block_ids() {
        for succ in func.block(block).terminator.successors() {
            graph.add_edge(nodes[&block], nodes[&succ], ());
        }
    }
    (graph, nodes)
}

/// Blocks reachable from the entry, entry included.
pub fn reachable_blocks(func: &Function) -> HashSet<BlockId> {
    let Some(entry) = func.entry() else {
        return HashSet::new();
    };
    let (graph, nodes) = function_cfg(func);
    let mut reached = HashSet::new();
    let mut dfs = Dfs::new(&graph, nodes[&entry]);
    while let Some(node) = dfs.next(&graph) {
        reached.insert(graph[node]);
    }
    reached
}

/// Number of CFG edges across every function body in the module.
pub fn edge_count(module: &umbra_core::Module) -> usize {
    module
        .functions()
        .filter(|(_, f)| !f.is_declaration())
        .map(|(_, f)| {
            f.block_ids()
                .map(|b| f.block(b).terminator.successors().len())
                .sum::<usize>()
        })
        .sum()
}
