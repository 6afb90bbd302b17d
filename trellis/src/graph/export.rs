//! JSON export for external schedulers
//!
//! The shape of this document is a stable interface consumed by CI systems:
//! `Groups` (agent name, machine types, node objects), `Triggers` and
//! `Reports`. Nodes already completed, or gated behind triggers that have
//! not fired, are filtered out.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use super::Graph;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportedNode {
    name: String,
    depends_on: Vec<String>,
    run_after: Vec<String>,
    notify: Vec<String>,
    notify_on_warnings: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportedGroup {
    name: String,
    #[serde(rename = "Agent Types")]
    agent_types: Vec<String>,
    nodes: Vec<ExportedNode>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportedTrigger {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportedReport {
    name: String,
    nodes: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportedGraph {
    groups: Vec<ExportedGroup>,
    triggers: Vec<ExportedTrigger>,
    reports: Vec<ExportedReport>,
}

/// Write the scheduler manifest, filtered to nodes ahead of `trigger` and
/// not in `completed`.
pub fn export_json(
    graph: &Graph,
    path: &Path,
    trigger: Option<&str>,
    completed: &BTreeSet<String>,
) -> Result<()> {
    let mut groups = Vec::new();
    for agent in &graph.agents {
        let nodes: Vec<ExportedNode> = agent
            .nodes
            .iter()
            .filter(|node| !completed.contains(&node.name))
            .filter(|node| graph.trigger_fired(node.trigger.as_deref(), trigger))
            .map(|node| {
                let mut depends_on: Vec<String> = node
                    .inputs
                    .iter()
                    .filter_map(|input| graph.tag_producer(input))
                    .map(|(producer, _)| producer.name.clone())
                    .collect();
                depends_on.sort();
                depends_on.dedup();
                ExportedNode {
                    name: node.name.clone(),
                    depends_on,
                    run_after: node.after.clone(),
                    notify: node.notify.clone(),
                    notify_on_warnings: node.notify_on_warnings,
                }
            })
            .collect();
        if !nodes.is_empty() {
            groups.push(ExportedGroup {
                name: agent.name.clone(),
                agent_types: agent.types.clone(),
                nodes,
            });
        }
    }

    let exported = ExportedGraph {
        groups,
        triggers: graph
            .triggers
            .iter()
            .map(|t| ExportedTrigger {
                name: t.name.clone(),
                parent: t.parent.clone(),
            })
            .collect(),
        reports: graph
            .reports
            .values()
            .map(|report| ExportedReport {
                name: report.name.clone(),
                nodes: report.nodes.clone(),
            })
            .collect(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&exported).context("Failed to serialize graph")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
