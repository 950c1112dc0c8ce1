// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::dag::registry::TaskRegistry;
use crate::errors::{PipelineError, Result};
use crate::types::TaskName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed acyclic graph of tasks.
///
/// Nodes are declaration indices; an edge `a -> b` means `b` depends on `a`
/// (it consumes an output of `a` or runs `after` it). Using indices as
/// node weights makes "smallest index first" the natural tie breaker.
#[derive(Debug, Clone)]
pub struct DagGraph {
    names: Vec<TaskName>,
    index: HashMap<TaskName, usize>,
    graph: DiGraphMap<usize, ()>,
}

impl DagGraph {
    /// Build the graph and reject cycles.
    pub fn build(registry: &TaskRegistry) -> Result<Self> {
        let mut names = Vec::with_capacity(registry.len());
        let mut index = HashMap::new();
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

        for task in registry.list_tasks() {
            names.push(task.name.clone());
            index.insert(task.name.clone(), task.index);
            graph.add_node(task.index);
        }

        for task in registry.list_tasks() {
            for dep in task.deps() {
                let dep_idx = registry.get(&dep).map(|d| d.index).ok_or_else(|| {
                    PipelineError::ConfigError(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.name, dep
                    ))
                })?;
                graph.add_edge(dep_idx, task.index, ());
            }
        }

        let dag = Self {
            names,
            index,
            graph,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    /// Depth-first traversal with three-colour marking.
    ///
    /// Reaching an in-progress node means the current DFS path loops back
    /// on itself; that path is reported, closed with the repeated node.
    fn check_acyclic(&self) -> Result<()> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];

        for start in 0..self.names.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            marks[start] = Mark::InProgress;
            let mut stack: Vec<(usize, Vec<usize>)> = vec![(start, self.children_desc(start))];

            loop {
                let Some(top) = stack.last_mut() else {
                    break;
                };
                let node = top.0;

                match top.1.pop() {
                    Some(next) => match marks[next] {
                        Mark::InProgress => {
                            let pos = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                            let mut path: Vec<TaskName> = stack[pos..]
                                .iter()
                                .map(|(n, _)| self.names[*n].clone())
                                .collect();
                            path.push(self.names[next].clone());
                            return Err(PipelineError::DagCycle { path });
                        }
                        Mark::Unvisited => {
                            marks[next] = Mark::InProgress;
                            stack.push((next, self.children_desc(next)));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    /// Dependents of `node`, largest index first (so `pop` yields ascending).
    fn children_desc(&self, node: usize) -> Vec<usize> {
        let mut children: Vec<usize> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.sort_unstable_by(|a, b| b.cmp(a));
        children
    }

    fn neighbors_sorted(&self, name: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self.graph.neighbors_directed(idx, dir).collect();
        out.sort_unstable();
        out.into_iter().map(|i| self.names[i].as_str()).collect()
    }

    fn closure(&self, name: &str, dir: Direction) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let Some(&start) = self.index.get(name) else {
            return seen;
        };

        let mut queue: VecDeque<usize> = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, dir) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// All task names in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Immediate prerequisites of a task.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbors_sorted(name, Direction::Incoming)
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbors_sorted(name, Direction::Outgoing)
    }

    /// Transitive prerequisites, topologically ordered.
    pub fn ancestors_of(&self, name: &str) -> Vec<TaskName> {
        self.order_indices(&self.closure(name, Direction::Incoming))
    }

    /// Transitive dependents, topologically ordered.
    pub fn descendants_of(&self, name: &str) -> Vec<TaskName> {
        self.order_indices(&self.closure(name, Direction::Outgoing))
    }

    /// Tasks nothing depends on (final pipeline outputs).
    pub fn terminal_tasks(&self) -> Vec<&str> {
        (0..self.names.len())
            .filter(|&i| {
                self.graph
                    .neighbors_directed(i, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|i| self.names[i].as_str())
            .collect()
    }

    /// Topologically sort a subset of tasks (Kahn's algorithm).
    ///
    /// Only edges between members of the subset count. Among tasks that are
    /// ready at the same time, the one declared first comes first. Unknown
    /// names are ignored.
    pub fn topo_order<'a, I>(&self, subset: I) -> Vec<TaskName>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let members: HashSet<usize> = subset
            .into_iter()
            .filter_map(|name| self.index.get(name).copied())
            .collect();
        self.order_indices(&members)
    }

    fn order_indices(&self, members: &HashSet<usize>) -> Vec<TaskName> {
        let mut indegree: HashMap<usize, usize> = members
            .iter()
            .map(|&n| {
                let deg = self
                    .graph
                    .neighbors_directed(n, Direction::Incoming)
                    .filter(|p| members.contains(p))
                    .count();
                (n, deg)
            })
            .collect();

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(node) = ready.pop_first() {
            order.push(self.names[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(deg) = indegree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        order
    }
}
