//! Dependency and parent-chain cycle guards.
//!
//! Edges live in the store as `(task_id, depends_on_id)` rows; nothing is
//! cached. The engine fetches the project's current edges inside the
//! write transaction and asks this module whether the candidate edges are
//! admissible.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Check that adding `new_edges` (each `a` depends on `b`) to the
/// existing edge set leaves the dependency relation acyclic.
pub fn ensure_acyclic(
    existing: &[(String, String)],
    new_edges: &[(String, String)],
) -> Result<()> {
    for (a, b) in new_edges {
        if a == b {
            return Err(Error::conflict(format!("task {a} cannot depend on itself"))
                .with_detail("task_id", a.as_str()));
        }
    }

    let mut graph: DiGraph<(), ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for (a, b) in existing.iter().chain(new_edges.iter()) {
        let from = *nodes
            .entry(a.as_str())
            .or_insert_with(|| graph.add_node(()));
        let to = *nodes
            .entry(b.as_str())
            .or_insert_with(|| graph.add_node(()));
        graph.add_edge(from, to, ());
    }

    if is_cyclic_directed(&graph) {
        let detail = new_edges
            .iter()
            .map(|(a, b)| format!("{a} -> {b}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::conflict(format!(
            "dependency would create a cycle: {detail}"
        )));
    }
    Ok(())
}

/// Check that pointing `task_id` at `new_parent` keeps the parent tree
/// acyclic. `parent_of` maps every project task to its current parent.
pub fn ensure_parent_acyclic(
    task_id: &str,
    new_parent: &str,
    parent_of: &HashMap<String, String>,
) -> Result<()> {
    if task_id == new_parent {
        return Err(Error::conflict(format!("task {task_id} cannot be its own parent")));
    }
    let mut current = new_parent;
    let mut hops = 0usize;
    while let Some(next) = parent_of.get(current) {
        if next == task_id {
            return Err(Error::conflict(format!(
                "parent change would create a cycle through {current}"
            )));
        }
        current = next;
        hops += 1;
        if hops > parent_of.len() {
            // Pre-existing corruption; refuse rather than loop.
            return Err(Error::internal("parent chain does not terminate"));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn edges(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn chain_is_fine() {
        let existing = edges(&[("a", "b"), ("b", "c")]);
        ensure_acyclic(&existing, &edges(&[("a", "c")])).unwrap();
    }

    #[test]
    fn self_dependency_rejected() {
        let err = ensure_acyclic(&[], &edges(&[("a", "a")])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn direct_cycle_rejected() {
        let existing = edges(&[("a", "b")]);
        let err = ensure_acyclic(&existing, &edges(&[("b", "a")])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn transitive_cycle_rejected() {
        let existing = edges(&[("a", "b"), ("b", "c")]);
        assert!(ensure_acyclic(&existing, &edges(&[("c", "a")])).is_err());
    }

    #[test]
    fn disjoint_edges_are_fine() {
        let existing = edges(&[("a", "b")]);
        ensure_acyclic(&existing, &edges(&[("c", "d")])).unwrap();
    }

    #[test]
    fn parent_chain_cycle_rejected() {
        let mut parent_of = HashMap::new();
        parent_of.insert("b".to_string(), "a".to_string());
        parent_of.insert("c".to_string(), "b".to_string());

        // a -> parent c would close a loop a -> c -> b -> a.
        let err = ensure_parent_acyclic("a", "c", &parent_of).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        // Fresh task under c is fine.
        ensure_parent_acyclic("d", "c", &parent_of).unwrap();
    }

    #[test]
    fn self_parent_rejected() {
        assert!(ensure_parent_acyclic("a", "a", &HashMap::new()).is_err());
    }
}
