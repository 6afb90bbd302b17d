//! Post-expansion script writer
//!
//! Emits the selected graph back as a script document: properties folded,
//! conditions resolved, macros and loops unrolled. The output parses back
//! through the reader into the same graph, which is how `--preprocess`
//! output stays usable as an input.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::graph::{Graph, Node};

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_node(out: &mut String, node: &Node, indent: &str) {
    let mut open = format!("{indent}<Node Name=\"{}\"", escape(&node.name));
    if !node.inputs.is_empty() {
        let _ = write!(open, " Requires=\"{}\"", escape(&node.inputs.join(";")));
    }
    let produces: Vec<&str> = node
        .outputs
        .iter()
        .filter(|output| !output.block_name().is_empty())
        .map(|output| output.tag.as_str())
        .collect();
    if !produces.is_empty() {
        let _ = write!(open, " Produces=\"{}\"", escape(&produces.join(";")));
    }
    if !node.after.is_empty() {
        let _ = write!(open, " After=\"{}\"", escape(&node.after.join(";")));
    }
    let empty = node.tasks.is_empty() && node.tokens.is_empty() && node.annotations.is_empty();
    if empty {
        let _ = writeln!(out, "{open}/>");
        return;
    }
    let _ = writeln!(out, "{open}>");
    for token in &node.tokens {
        let _ = writeln!(
            out,
            "{indent}  <Token Path=\"{}\"/>",
            escape(&token.display().to_string())
        );
    }
    for (name, value) in &node.annotations {
        let _ = writeln!(
            out,
            "{indent}  <Annotation Name=\"{}\" Value=\"{}\"/>",
            escape(name),
            escape(value)
        );
    }
    for task in &node.tasks {
        let mut line = format!("{indent}  <{}", task.name);
        for (attr, value) in &task.attrs {
            let _ = write!(line, " {attr}=\"{}\"", escape(value));
        }
        let _ = writeln!(out, "{line}/>");
    }
    let _ = writeln!(out, "{indent}</Node>");
}

fn write_agents_under(out: &mut String, graph: &Graph, trigger: Option<&str>, indent: &str) {
    for agent in &graph.agents {
        let matches = match (&agent.trigger, trigger) {
            (None, None) => true,
            (Some(a), Some(t)) => a.eq_ignore_ascii_case(t),
            _ => false,
        };
        if !matches {
            continue;
        }
        let mut open = format!("{indent}<Agent Name=\"{}\"", escape(&agent.name));
        if !agent.types.is_empty() {
            let _ = write!(open, " Type=\"{}\"", escape(&agent.types.join(";")));
        }
        let _ = writeln!(out, "{open}>");
        for node in &agent.nodes {
            write_node(out, node, &format!("{indent}  "));
        }
        let _ = writeln!(out, "{indent}</Agent>");
    }
}

fn write_triggers_under(out: &mut String, graph: &Graph, parent: Option<&str>, indent: &str) {
    for trigger in &graph.triggers {
        let matches = match (&trigger.parent, parent) {
            (None, None) => true,
            (Some(a), Some(p)) => a.eq_ignore_ascii_case(p),
            _ => false,
        };
        if !matches {
            continue;
        }
        let _ = writeln!(out, "{indent}<Trigger Name=\"{}\">", escape(&trigger.name));
        let inner = format!("{indent}  ");
        write_agents_under(out, graph, Some(&trigger.name), &inner);
        write_triggers_under(out, graph, Some(&trigger.name), &inner);
        let _ = writeln!(out, "{indent}</Trigger>");
    }
}

/// Render the graph as a script document
pub fn render(graph: &Graph) -> String {
    let mut out = String::from("<BuildGraph>\n");
    write_agents_under(&mut out, graph, None, "  ");
    write_triggers_under(&mut out, graph, None, "  ");
    for (name, members) in &graph.aggregates {
        let _ = writeln!(
            out,
            "  <Aggregate Name=\"{}\" Requires=\"{}\"/>",
            escape(name),
            escape(&members.join(";"))
        );
    }
    for report in graph.reports.values() {
        let _ = writeln!(
            out,
            "  <Report Name=\"{}\" Requires=\"{}\"/>",
            escape(&report.name),
            escape(&report.nodes.join(";"))
        );
    }
    for label in &graph.labels {
        let mut line = format!("  <Label Name=\"{}\"", escape(&label.name));
        if let Some(category) = &label.category {
            let _ = write!(line, " Category=\"{}\"", escape(category));
        }
        let _ = writeln!(
            out,
            "{line} Requires=\"{}\"/>",
            escape(&label.nodes.join(";"))
        );
    }
    for node in graph.nodes() {
        if !node.notify.is_empty() {
            let _ = writeln!(
                out,
                "  <Notify Targets=\"{}\" Users=\"{}\" Warnings=\"{}\"/>",
                escape(&node.name),
                escape(&node.notify.join(";")),
                node.notify_on_warnings
            );
        }
    }
    out.push_str("</BuildGraph>\n");
    out
}

/// Write the preprocessed script to a file
pub fn write(graph: &Graph, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, render(graph)).with_context(|| format!("Failed to write {}", path.display()))
}
