//! Argument-chain graph over the finished transcript.
//!
//! Turns are nodes, a directed edge `i → j` means turn `j` refers to or
//! rebuts turn `i`. References only ever point backwards, so the graph is
//! a DAG by construction; strongest chains maximise cumulative strength
//! times depth.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::session::Turn;

/// One path through the argument graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentChain {
    /// Turn indices along the chain, oldest first.
    pub turns: Vec<usize>,
    pub cumulative_strength: f64,
    pub depth: usize,
    /// Ranking key: cumulative strength × depth.
    pub score: f64,
}

/// The assembled graph plus its strongest chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnalysis {
    /// All reference edges as `(from_turn, to_turn)`.
    pub edges: Vec<(usize, usize)>,
    /// Top chains by score, best first.
    pub strongest: Vec<ArgumentChain>,
}

/// How many chains the analysis keeps.
const CHAIN_LIMIT: usize = 3;

/// Build the chain analysis for a transcript.
pub fn build_chains(turns: &[Turn]) -> Result<ChainAnalysis, String> {
    if turns.is_empty() {
        return Err("empty transcript".to_string());
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = turns.iter().map(|t| graph.add_node(t.index)).collect();

    let mut edges = Vec::new();
    for (position, turn) in turns.iter().enumerate() {
        for &referenced in &turn.analysis.structure.references {
            if let Some(ref_position) = turns.iter().position(|t| t.index == referenced) {
                graph.add_edge(nodes[ref_position], nodes[position], ());
                edges.push((referenced, turn.index));
            }
        }
    }

    let order = toposort(&graph, None).map_err(|_| "reference cycle detected".to_string())?;

    // Best chain ending at each node: strength-sum plus the path that got
    // there, filled in topological order.
    let mut best: Vec<(f64, Vec<usize>)> = turns
        .iter()
        .map(|t| (t.analysis.strength, vec![t.index]))
        .collect();
    for node in order {
        let position = node.index();
        let incoming: Vec<usize> = graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|n| n.index())
            .collect();
        for from in incoming {
            let candidate = best[from].0 + turns[position].analysis.strength;
            if candidate > best[position].0 {
                let mut path = best[from].1.clone();
                path.push(turns[position].index);
                best[position] = (candidate, path);
            }
        }
    }

    let mut chains: Vec<ArgumentChain> = best
        .into_iter()
        .map(|(strength, path)| ArgumentChain {
            depth: path.len(),
            cumulative_strength: strength,
            score: strength * path.len() as f64,
            turns: path,
        })
        .collect();
    chains.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    chains.dedup_by(|a, b| a.turns.last() == b.turns.last() && a.turns == b.turns);
    chains.truncate(CHAIN_LIMIT);

    Ok(ChainAnalysis {
        edges,
        strongest: chains,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::phase::Role;
    use crate::session::test_support::{plain_analysis, turn_at};

    fn referencing_turn(index: usize, refs: Vec<usize>, strength: f64) -> crate::session::Turn {
        let mut turn = turn_at(index, Role::Debater((index % 2) as u8), "content");
        turn.analysis = plain_analysis(strength);
        turn.analysis.structure.references = refs;
        turn
    }

    #[test]
    fn test_empty_transcript_degrades() {
        assert!(build_chains(&[]).is_err());
    }

    #[test]
    fn test_edges_follow_references() {
        let turns = vec![
            referencing_turn(0, vec![], 0.5),
            referencing_turn(1, vec![0], 0.6),
            referencing_turn(2, vec![1], 0.7),
        ];
        let analysis = build_chains(&turns).unwrap();
        assert_eq!(analysis.edges, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_strongest_chain_spans_the_thread() {
        let turns = vec![
            referencing_turn(0, vec![], 0.8),
            referencing_turn(1, vec![0], 0.7),
            referencing_turn(2, vec![1], 0.9),
            referencing_turn(3, vec![], 0.95), // strong but isolated
        ];
        let analysis = build_chains(&turns).unwrap();
        let best = &analysis.strongest[0];
        assert_eq!(best.turns, vec![0, 1, 2]);
        assert_eq!(best.depth, 3);
        // Depth multiplies: the three-turn thread outscores the lone 0.95.
        assert!(best.score > 0.95);
    }

    #[test]
    fn test_unreferenced_turns_are_singletons() {
        let turns = vec![
            referencing_turn(0, vec![], 0.5),
            referencing_turn(1, vec![], 0.6),
        ];
        let analysis = build_chains(&turns).unwrap();
        assert!(analysis.edges.is_empty());
        assert!(analysis.strongest.iter().all(|c| c.depth == 1));
    }

    #[test]
    fn test_dangling_reference_ignored() {
        let turns = vec![referencing_turn(0, vec![42], 0.5)];
        let analysis = build_chains(&turns).unwrap();
        assert!(analysis.edges.is_empty());
    }
}
