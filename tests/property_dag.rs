use std::collections::HashMap;

use proptest::prelude::*;

use pipedag::config::ConfigFile;
use pipedag::dag::{DagGraph, TaskRegistry};
use pipedag::errors::PipelineError;

use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

/// For each task `i`, a list of candidate prerequisites (reduced modulo `i`
/// so edges always point backwards and the graph stays acyclic).
fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(any::<usize>(), 0..4), 1..12)
}

fn config_from(edges: &[Vec<usize>], back_edge: bool) -> ConfigFile {
    let n = edges.len();
    let mut builder = ConfigFileBuilder::new();

    for (i, deps) in edges.iter().enumerate() {
        let mut task = TaskConfigBuilder::new(&format!("make-{i}")).output(&format!("out/{i}.txt"));
        if i > 0 {
            let mut seen = Vec::new();
            for d in deps.iter().map(|d| d % i) {
                if !seen.contains(&d) {
                    seen.push(d);
                    task = task.input(&format!("out/{d}.txt"));
                }
            }
            // Keep the chain connected so a back edge always closes a cycle.
            if back_edge && !seen.contains(&(i - 1)) {
                task = task.after(&format!("t{}", i - 1));
            }
        } else if back_edge && n > 1 {
            task = task.after(&format!("t{}", n - 1));
        }
        builder = builder.with_task(&format!("t{i}"), task.build());
    }

    builder.build()
}

proptest! {
    #[test]
    fn topo_order_puts_every_prerequisite_first(edges in dag_strategy()) {
        let cfg = config_from(&edges, false);
        let registry = TaskRegistry::from_config(&cfg).expect("registry");
        let graph = DagGraph::build(&registry).expect("acyclic");

        let order = graph.topo_order(graph.tasks());
        prop_assert_eq!(order.len(), edges.len());

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        for name in order.iter() {
            for dep in graph.dependencies_of(name) {
                prop_assert!(position[dep] < position[name.as_str()]);
            }
        }
    }

    #[test]
    fn ancestors_are_closed_under_dependencies(edges in dag_strategy()) {
        let cfg = config_from(&edges, false);
        let registry = TaskRegistry::from_config(&cfg).expect("registry");
        let graph = DagGraph::build(&registry).expect("acyclic");

        for name in graph.tasks() {
            let ancestors = graph.ancestors_of(name);
            prop_assert!(!ancestors.iter().any(|a| a == name));
            for a in ancestors.iter() {
                for dep in graph.dependencies_of(a) {
                    prop_assert!(ancestors.iter().any(|x| x == dep));
                }
                prop_assert!(graph.descendants_of(a).iter().any(|d| d == name));
            }
        }
    }

    #[test]
    fn back_edge_is_always_rejected(edges in dag_strategy()) {
        prop_assume!(edges.len() > 1);
        let cfg = config_from(&edges, true);
        let registry = TaskRegistry::from_config(&cfg).expect("registry");

        match DagGraph::build(&registry) {
            Err(PipelineError::DagCycle { path }) => {
                prop_assert!(path.len() >= 3);
                prop_assert_eq!(path.first(), path.last());
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|_| ())),
        }
    }
}
