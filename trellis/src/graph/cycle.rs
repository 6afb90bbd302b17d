//! Cycle detection and dependency-ordered traversal

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};

use super::Graph;

/// Names of the nodes `name` depends on: the producers of its inputs plus
/// any order-only `After` predecessors still present in the graph.
fn dependencies(graph: &Graph, name: &str) -> Vec<String> {
    let mut deps = Vec::new();
    if let Some(node) = graph.node(name) {
        for input in &node.inputs {
            if let Some((producer, _)) = graph.tag_producer(input) {
                deps.push(producer.name.clone());
            }
        }
        for after in &node.after {
            if graph.node(after).is_some() {
                deps.push(after.clone());
            }
        }
    }
    deps
}

/// Detect circular dependencies using DFS color marking
pub fn check_acyclic(graph: &Graph) -> Result<()> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in graph.nodes() {
        if !visited.contains(&node.name) {
            if let Some(cycle) =
                dfs_detect_cycle(graph, &node.name, &mut visited, &mut rec_stack, &mut path)
            {
                bail!("Circular dependency detected: {}", cycle.join(" -> "));
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle(
    graph: &Graph,
    name: &str,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(name.to_string());
    rec_stack.insert(name.to_string());
    path.push(name.to_string());

    for dep in dependencies(graph, name) {
        if !visited.contains(&dep) {
            if let Some(cycle) = dfs_detect_cycle(graph, &dep, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(&dep) {
            let mut cycle = vec![dep.clone()];
            for p in path.iter().rev() {
                cycle.push(p.clone());
                if *p == dep {
                    break;
                }
            }
            cycle.reverse();
            return Some(cycle);
        }
    }

    path.pop();
    rec_stack.remove(name);
    None
}

/// Topological order of the current node set, breaking ties by declaration
/// order.
pub fn topological_order(graph: &Graph) -> Result<Vec<String>> {
    let declared: Vec<String> = graph.nodes().map(|node| node.name.clone()).collect();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for name in &declared {
        let deps = dependencies(graph, name);
        in_degree.insert(name.clone(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name.clone());
        }
    }

    let mut result = Vec::with_capacity(declared.len());
    let mut emitted: HashSet<String> = HashSet::new();
    while result.len() < declared.len() {
        // First node in declaration order whose dependencies are all emitted
        let next = declared.iter().find(|name| {
            !emitted.contains(*name) && in_degree.get(*name).copied().unwrap_or(0) == 0
        });
        let Some(name) = next else {
            bail!("Cycle detected in graph");
        };
        emitted.insert(name.clone());
        result.push(name.clone());
        if let Some(children) = dependents.get(name) {
            for child in children.clone() {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
    }
    Ok(result)
}
