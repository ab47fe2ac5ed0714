//! Unit tests for dependency graph traversal.

use crate::task::domain::{DependencyGraph, TaskId};
use eyre::ensure;
use rstest::{fixture, rstest};

const fn id(value: i64) -> TaskId {
    TaskId::new(value)
}

#[fixture]
fn diamond() -> DependencyGraph {
    // 1 -> {2, 3}, 2 -> 4, 3 -> 4
    let mut graph = DependencyGraph::new();
    graph.insert(id(1), [id(2), id(3)]);
    graph.insert(id(2), [id(4)]);
    graph.insert(id(3), [id(4)]);
    graph.insert(id(4), []);
    graph
}

#[rstest]
fn chain_yields_every_descendant() -> eyre::Result<()> {
    let mut graph = DependencyGraph::new();
    graph.insert(id(1), [id(2)]);
    graph.insert(id(2), [id(3)]);
    ensure!(graph.dependents_of(id(1))? == vec![id(2), id(3)], "chain order");
    Ok(())
}

#[rstest]
fn shared_descendant_is_reported_once(diamond: DependencyGraph) -> eyre::Result<()> {
    let dependents = diamond.dependents_of(id(1))?;
    ensure!(dependents == vec![id(2), id(3), id(4)], "dependents: {dependents:?}");
    Ok(())
}

#[rstest]
fn traversal_starts_at_root(diamond: DependencyGraph) -> eyre::Result<()> {
    ensure!(diamond.dependents_of(id(3))? == vec![id(4)], "only 4 below 3");
    ensure!(diamond.dependents_of(id(4))?.is_empty(), "4 is a leaf");
    Ok(())
}

#[rstest]
fn leaf_without_edges_has_no_dependents() -> eyre::Result<()> {
    ensure!(DependencyGraph::new().dependents_of(id(9))?.is_empty(), "no edges");
    Ok(())
}

#[rstest]
#[case::self_loop(vec![(1, vec![1])])]
#[case::two_cycle(vec![(1, vec![2]), (2, vec![1])])]
#[case::deep_cycle(vec![(1, vec![2]), (2, vec![3]), (3, vec![4]), (4, vec![2])])]
fn cycle_is_rejected(#[case] edges: Vec<(i64, Vec<i64>)>) {
    let mut graph = DependencyGraph::new();
    for (from, to) in edges {
        graph.insert(id(from), to.into_iter().map(id));
    }
    assert!(graph.dependents_of(id(1)).is_err());
}

#[rstest]
fn cycle_outside_reach_is_ignored() -> eyre::Result<()> {
    let mut graph = DependencyGraph::new();
    graph.insert(id(1), [id(2)]);
    graph.insert(id(5), [id(6)]);
    graph.insert(id(6), [id(5)]);
    ensure!(graph.dependents_of(id(1))? == vec![id(2)], "cycle not reached");
    Ok(())
}
