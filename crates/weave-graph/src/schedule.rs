use std::collections::BTreeSet;

use weave_core::{WeaveError, WeaveResult};

use crate::graph::RenderGraph;
use crate::slot::SlotDirection;

/// A deterministic execution order over a graph's stages.
///
/// Stages are identified by their insertion index in the graph. Alongside
/// the total order the schedule records each stage's dependency level
/// (longest path from a source), which the parallel executor uses to find
/// stages that may run side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    version: u64,
    order: Vec<usize>,
    names: Vec<String>,
    levels: Vec<usize>,
}

impl Schedule {
    /// Order the stages of `graph` with in-degree elimination.
    ///
    /// Among ready stages the one inserted first always runs next, so the
    /// result depends only on insertion order and edges.
    pub fn build(graph: &RenderGraph) -> WeaveResult<Self> {
        let entries = graph.entries();
        let n = entries.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for edge in graph.edges() {
            let consumer = graph
                .stage_index(&edge.to.stage)
                .ok_or_else(|| WeaveError::UnknownStage(edge.to.stage.clone()))?;
            let producer = graph
                .stage_index(&edge.from.stage)
                .filter(|&i| {
                    entries[i]
                        .stage
                        .reflection()
                        .find(&edge.from.slot, SlotDirection::Output)
                        .is_some()
                })
                .ok_or_else(|| WeaveError::UnsatisfiedInput {
                    stage: edge.to.stage.clone(),
                    slot: edge.to.slot.clone(),
                    producer: edge.from.to_string(),
                })?;
            successors[producer].push(consumer);
            in_degree[consumer] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut level = vec![0usize; n];
        let mut order = Vec::with_capacity(n);

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &succ in &successors[next] {
                level[succ] = level[succ].max(level[next] + 1);
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() < n {
            let stages = cycle_members(&successors, &in_degree)
                .into_iter()
                .map(|i| entries[i].name.clone())
                .collect();
            return Err(WeaveError::CyclicDependency { stages });
        }

        Ok(Self {
            version: graph.version(),
            names: order.iter().map(|&i| entries[i].name.clone()).collect(),
            levels: order.iter().map(|&i| level[i]).collect(),
            order,
        })
    }

    /// Topology version of the graph this schedule was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stage insertion indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Stage names in execution order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.position(name).map(|p| self.levels[p])
    }

    /// Number of dependency levels.
    pub fn depth(&self) -> usize {
        self.levels.iter().max().map_or(0, |l| l + 1)
    }

    /// Stage indices grouped by level; each group keeps execution order.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.depth()];
        for (&index, &level) in self.order.iter().zip(&self.levels) {
            groups[level].push(index);
        }
        groups
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (pos, (name, level)) in self.names.iter().zip(&self.levels).enumerate() {
            writeln!(f, "{:>3}. {} (level {})", pos + 1, name, level)?;
        }
        Ok(())
    }
}

/// Nodes left over after elimination that lie on a cycle, in index order.
///
/// Leftover nodes are either on a cycle or downstream of one; only the
/// former can reach themselves.
fn cycle_members(successors: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
    (0..successors.len())
        .filter(|&start| remaining[start] && reaches(successors, &remaining, start, start))
        .collect()
}

fn reaches(successors: &[Vec<usize>], remaining: &[bool], from: usize, target: usize) -> bool {
    let mut seen = vec![false; successors.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        for &succ in &successors[node] {
            if succ == target {
                return true;
            }
            if remaining[succ] && !seen[succ] {
                seen[succ] = true;
                stack.push(succ);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotRef;
    use crate::testing::{affine, stage, value};

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut g = RenderGraph::new("ties");
        g.add_stage(value(1.0), "b").unwrap();
        g.add_stage(value(2.0), "a").unwrap();
        g.add_stage(stage("Sum"), "sum").unwrap();
        g.add_edge("a.out", "sum.a").unwrap();
        g.add_edge("b.out", "sum.b").unwrap();

        let schedule = g.schedule().unwrap();
        assert_eq!(schedule.names(), &["b", "a", "sum"]);
        assert_eq!(schedule.level_of("sum"), Some(1));
    }

    #[test]
    fn test_consumer_inserted_before_producer() {
        let mut g = RenderGraph::new("reversed");
        g.add_stage(affine(1.0, 1.0), "t").unwrap();
        g.add_stage(value(1.0), "src").unwrap();
        g.add_edge("src.out", "t.in").unwrap();
        assert_eq!(g.schedule().unwrap().names(), &["src", "t"]);
    }

    #[test]
    fn test_two_cycle_names_both() {
        let mut g = RenderGraph::new("cycle");
        g.add_stage(affine(1.0, 0.0), "A").unwrap();
        g.add_stage(affine(1.0, 0.0), "B").unwrap();
        g.add_edge("A.out", "B.in").unwrap();
        g.add_edge("B.out", "A.in").unwrap();

        match g.schedule() {
            Err(WeaveError::CyclicDependency { stages }) => assert_eq!(stages, vec!["A", "B"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_downstream_of_cycle_not_named() {
        let mut g = RenderGraph::new("cycle");
        g.add_stage(value(1.0), "src").unwrap();
        g.add_stage(stage("Sum"), "A").unwrap();
        g.add_stage(affine(1.0, 0.0), "B").unwrap();
        g.add_stage(affine(1.0, 0.0), "after").unwrap();
        g.add_edge("src.out", "A.a").unwrap();
        g.add_edge("A.out", "B.in").unwrap();
        g.add_edge("B.out", "A.b").unwrap();
        g.add_edge("A.out", "after.in").unwrap();

        match g.schedule() {
            Err(WeaveError::CyclicDependency { stages }) => assert_eq!(stages, vec!["A", "B"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let mut g = RenderGraph::new("self");
        g.add_stage(affine(1.0, 0.0), "loop").unwrap();
        g.add_edge("loop.out", "loop.in").unwrap();
        match g.schedule() {
            Err(WeaveError::CyclicDependency { stages }) => assert_eq!(stages, vec!["loop"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_producer() {
        let mut g = RenderGraph::new("dangling");
        g.add_stage(affine(1.0, 0.0), "t").unwrap();
        g.push_edge_unchecked(SlotRef::new("ghost", "out"), SlotRef::new("t", "in"));
        match g.schedule() {
            Err(WeaveError::UnsatisfiedInput {
                stage,
                slot,
                producer,
            }) => {
                assert_eq!(stage, "t");
                assert_eq!(slot, "in");
                assert_eq!(producer, "ghost.out");
            }
            other => panic!("expected unsatisfied input, got {:?}", other),
        }
    }

    #[test]
    fn test_levels_group_diamond() {
        let mut g = RenderGraph::new("diamond");
        g.add_stage(value(1.0), "src").unwrap();
        g.add_stage(affine(2.0, 0.0), "left").unwrap();
        g.add_stage(affine(3.0, 0.0), "right").unwrap();
        g.add_stage(stage("Sum"), "join").unwrap();
        g.add_edge("src.out", "left.in").unwrap();
        g.add_edge("src.out", "right.in").unwrap();
        g.add_edge("left.out", "join.a").unwrap();
        g.add_edge("right.out", "join.b").unwrap();

        let schedule = g.schedule().unwrap();
        assert_eq!(schedule.depth(), 3);
        assert_eq!(schedule.levels(), vec![vec![0], vec![1, 2], vec![3]]);
        assert!(schedule.to_string().contains("join (level 2)"));
    }

    #[test]
    fn test_empty_graph() {
        let g = RenderGraph::new("empty");
        let schedule = g.schedule().unwrap();
        assert!(schedule.is_empty());
        assert_eq!(schedule.depth(), 0);
        assert!(schedule.levels().is_empty());
    }
}
