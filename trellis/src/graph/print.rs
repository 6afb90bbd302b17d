//! Human-readable graph dump, grouped by trigger, agent and node

use colored::{ColoredString, Colorize};
use std::collections::BTreeSet;

use super::{Graph, Node};

/// Print-time detail switches
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions {
    pub show_deps: bool,
    pub show_notifications: bool,
}

fn node_indicator(completed: bool) -> ColoredString {
    if completed {
        "✓".green().bold()
    } else {
        "○".white().dimmed()
    }
}

fn print_node(graph: &Graph, node: &Node, completed: &BTreeSet<String>, options: &PrintOptions) {
    let marker = node_indicator(completed.contains(&node.name));
    println!("    {marker} {}", node.name.bold());

    if options.show_deps {
        let mut deps: Vec<String> = node
            .inputs
            .iter()
            .filter_map(|input| graph.tag_producer(input))
            .map(|(producer, _)| producer.name.clone())
            .collect();
        deps.extend(node.after.iter().map(|after| format!("{after} (order only)")));
        deps.sort();
        deps.dedup();
        for dep in deps {
            println!("        depends on {}", dep.dimmed());
        }
    }

    if options.show_notifications {
        if node.notify.is_empty() {
            println!("        {}", "no notification recipients".dimmed());
        } else {
            println!(
                "        notify {}{}",
                node.notify.join(", "),
                if node.notify_on_warnings {
                    " (on warnings)"
                } else {
                    ""
                }
            );
        }
    }
}

/// Dump the graph grouped Trigger → Agent → Node, annotating completion
pub fn print_graph(graph: &Graph, completed: &BTreeSet<String>, options: &PrintOptions) {
    // Untriggered agents first, then one section per trigger in order
    let mut sections: Vec<Option<String>> = vec![None];
    sections.extend(graph.triggers.iter().map(|t| Some(t.name.clone())));

    for section in sections {
        let agents: Vec<_> = graph
            .agents
            .iter()
            .filter(|agent| match (&agent.trigger, &section) {
                (None, None) => true,
                (Some(a), Some(s)) => a.eq_ignore_ascii_case(s),
                _ => false,
            })
            .collect();
        if agents.is_empty() {
            continue;
        }
        match &section {
            None => println!("{}", "Graph:".bold()),
            Some(name) => println!("{} {}", "Trigger:".bold(), name.cyan().bold()),
        }
        for agent in agents {
            println!("  {} ({})", agent.name, agent.types.join(", ").dimmed());
            for node in &agent.nodes {
                print_node(graph, node, completed, options);
            }
        }
        println!();
    }

    if !graph.reports.is_empty() {
        println!("{}", "Reports:".bold());
        for report in graph.reports.values() {
            println!("  {} -> {}", report.name, report.nodes.join(", "));
        }
        println!();
    }
}
