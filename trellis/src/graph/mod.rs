//! Build graph model: agents, triggers, nodes and tagged outputs
//!
//! The reader constructs a `Graph`; selection and trigger filtering mutate
//! it before execution; during execution it is immutable.

mod cycle;
mod export;
mod print;

pub use export::export_json;
pub use print::{print_graph, PrintOptions};

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use crate::task::{BoundParams, Task};

/// Severity of a buffered script diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A `<Warning>` or `<Error>` encountered during reading, buffered until
/// after selection so deselected subgraphs stay quiet.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Controlling trigger at the point the element appeared
    pub enclosing_trigger: Option<String>,
}

/// Optional named gate; nodes under a trigger run only when it has fired
#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub parent: Option<String>,
}

/// One tagged file set produced by a node
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// Tag name, with the leading `#`
    pub tag: String,
    /// Producing node
    pub node: String,
}

impl NodeOutput {
    /// Storage block name: the default output maps to the empty block
    pub fn block_name(&self) -> &str {
        let body = self.tag.trim_start_matches('#');
        if body == self.node {
            ""
        } else {
            body
        }
    }
}

/// One task instance inside a node, with its bound (expanded) attributes
/// retained for preprocessed output.
pub struct TaskInstance {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub params: BoundParams,
    pub task: Box<dyn Task>,
}

impl std::fmt::Debug for TaskInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskInstance")
            .field("name", &self.name)
            .field("attrs", &self.attrs)
            .finish()
    }
}

/// A named unit of work: an ordered task list producing tagged outputs
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub agent: String,
    /// Controlling trigger (None = unconditional)
    pub trigger: Option<String>,
    /// Outputs, implicit default first
    pub outputs: Vec<NodeOutput>,
    /// Tags produced by other nodes that this node consumes
    pub inputs: Vec<String>,
    /// Order-only predecessors (node names)
    pub after: Vec<String>,
    pub tasks: Vec<TaskInstance>,
    /// Token files that must be held before this node may run
    pub tokens: Vec<PathBuf>,
    /// Notification recipients
    pub notify: Vec<String>,
    pub notify_on_warnings: bool,
    /// Freeform key/value metadata for external consumers
    pub annotations: BTreeMap<String, String>,
}

impl Node {
    /// Tag name of the implicit default output
    pub fn default_output_tag(&self) -> String {
        format!("#{}", self.name)
    }

    /// Find an output by tag name
    pub fn output(&self, tag: &str) -> Option<&NodeOutput> {
        self.outputs.iter().find(|output| output.tag == tag)
    }
}

/// Logical machine assignment for a group of nodes
#[derive(Debug)]
pub struct Agent {
    pub name: String,
    /// Candidate platforms, in preference order
    pub types: Vec<String>,
    pub trigger: Option<String>,
    pub nodes: Vec<Node>,
}

/// A named report covering a set of nodes
#[derive(Debug, Clone)]
pub struct Report {
    pub name: String,
    pub nodes: Vec<String>,
}

/// A named badge covering a set of nodes
#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub category: Option<String>,
    pub nodes: Vec<String>,
}

/// The whole parsed graph
#[derive(Debug, Default)]
pub struct Graph {
    /// Agents in declaration order; nodes within them likewise
    pub agents: Vec<Agent>,
    pub triggers: Vec<Trigger>,
    pub aggregates: BTreeMap<String, Vec<String>>,
    pub reports: BTreeMap<String, Report>,
    pub labels: Vec<Label>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Graph {
    /// All nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.agents.iter().flat_map(|agent| agent.nodes.iter())
    }

    /// Find a node by name (names are case-insensitive)
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|node| node.name.eq_ignore_ascii_case(name))
    }

    /// Mutable lookup by name
    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.agents
            .iter_mut()
            .flat_map(|agent| agent.nodes.iter_mut())
            .find(|node| node.name.eq_ignore_ascii_case(name))
    }

    /// Find a trigger by name
    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers
            .iter()
            .find(|trigger| trigger.name.eq_ignore_ascii_case(name))
    }

    /// The node producing a tag, along with the output itself
    pub fn tag_producer(&self, tag: &str) -> Option<(&Node, &NodeOutput)> {
        self.nodes().find_map(|node| {
            node.output(tag).map(|output| (node, output))
        })
    }

    /// Trigger chain from a trigger up to the root, inclusive
    pub fn trigger_ancestry(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(trigger_name) = current {
            if chain.iter().any(|c: &String| c.eq_ignore_ascii_case(&trigger_name)) {
                break;
            }
            chain.push(trigger_name.clone());
            current = self
                .trigger(&trigger_name)
                .and_then(|trigger| trigger.parent.clone());
        }
        chain
    }

    /// Whether a node's controlling trigger has fired given the requested
    /// trigger. Untriggered nodes always have.
    pub fn trigger_fired(&self, controlling: Option<&str>, requested: Option<&str>) -> bool {
        match controlling {
            None => true,
            Some(controlling) => match requested {
                None => false,
                Some(requested) => self
                    .trigger_ancestry(requested)
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(controlling)),
            },
        }
    }

    /// Resolve a reference to a set of node names. The reference may be a
    /// node name, an aggregate name, or a `#Tag`.
    pub fn resolve_reference(&self, name: &str) -> Result<Vec<String>> {
        if name.starts_with('#') {
            let (node, _) = self
                .tag_producer(name)
                .with_context(|| format!("Reference to undefined tag '{name}'"))?;
            return Ok(vec![node.name.clone()]);
        }
        if let Some(node) = self.node(name) {
            return Ok(vec![node.name.clone()]);
        }
        if let Some((_, members)) = self
            .aggregates
            .iter()
            .find(|(aggregate, _)| aggregate.eq_ignore_ascii_case(name))
        {
            return Ok(members.clone());
        }
        bail!("Reference to undefined node, aggregate or tag '{name}'");
    }

    /// Retain only nodes for which `keep` holds; prune agents, triggers,
    /// aggregates, reports and labels that no longer apply. Returns the
    /// names of the removed nodes.
    fn retain_nodes(&mut self, keep: impl Fn(&Node) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        for agent in &mut self.agents {
            let mut kept = Vec::new();
            for node in agent.nodes.drain(..) {
                if keep(&node) {
                    kept.push(node);
                } else {
                    removed.push(node.name.clone());
                }
            }
            agent.nodes = kept;
        }
        self.agents.retain(|agent| !agent.nodes.is_empty());

        let removed_set: HashSet<&String> = removed.iter().collect();

        // Triggers still controlling a node, plus their ancestors, survive
        let mut live_triggers: HashSet<String> = HashSet::new();
        for agent in &self.agents {
            if let Some(trigger) = &agent.trigger {
                for name in self.trigger_ancestry(trigger) {
                    live_triggers.insert(name.to_ascii_lowercase());
                }
            }
        }
        self.triggers
            .retain(|trigger| live_triggers.contains(&trigger.name.to_ascii_lowercase()));

        // An aggregate missing any member no longer means what it said
        self.aggregates
            .retain(|_, members| members.iter().all(|member| !removed_set.contains(member)));

        for report in self.reports.values_mut() {
            report.nodes.retain(|node| !removed_set.contains(node));
        }
        self.reports.retain(|_, report| !report.nodes.is_empty());

        for label in &mut self.labels {
            label.nodes.retain(|node| !removed_set.contains(node));
        }
        self.labels.retain(|label| !label.nodes.is_empty());

        removed
    }

    /// Keep exactly the transitive input closure of the target set.
    ///
    /// Targets may be node names, aggregate names or tags. Unreferenced
    /// agents, triggers, aggregates, reports and labels are dropped.
    pub fn select(&mut self, targets: &[String]) -> Result<()> {
        let mut selected: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = Vec::new();
        for target in targets {
            frontier.extend(self.resolve_reference(target)?);
        }
        while let Some(name) = frontier.pop() {
            if !selected.insert(name.clone()) {
                continue;
            }
            let node = self
                .node(&name)
                .with_context(|| format!("Unknown node '{name}'"))?;
            for input in &node.inputs {
                let (producer, _) = self
                    .tag_producer(input)
                    .with_context(|| format!("Undefined tag '{input}' required by '{name}'"))?;
                frontier.push(producer.name.clone());
            }
        }
        self.retain_nodes(|node| selected.contains(&node.name));
        Ok(())
    }

    /// Drop every node controlled by one of the named triggers (or by a
    /// trigger nested under one). A kept node that required a dropped
    /// producer is an error.
    pub fn skip_triggers(&mut self, names: &[String]) -> Result<()> {
        // Look each skip name up individually
        for name in names {
            if self.trigger(name).is_none() {
                bail!("Unknown trigger '{name}'");
            }
        }

        let skipped: Vec<String> = self
            .triggers
            .iter()
            .filter(|trigger| {
                self.trigger_ancestry(&trigger.name).iter().any(|ancestor| {
                    names.iter().any(|name| name.eq_ignore_ascii_case(ancestor))
                })
            })
            .map(|trigger| trigger.name.clone())
            .collect();

        self.retain_nodes(|node| match &node.trigger {
            Some(trigger) => !skipped.iter().any(|s| s.eq_ignore_ascii_case(trigger)),
            None => true,
        });
        self.triggers
            .retain(|trigger| !skipped.iter().any(|s| s.eq_ignore_ascii_case(&trigger.name)));

        self.check_missing_producers("skipped trigger")
    }

    /// Drop every node whose controlling trigger has not fired
    pub fn filter_unfired_triggers(&mut self, requested: Option<&str>) -> Result<()> {
        if let Some(name) = requested {
            if self.trigger(name).is_none() {
                bail!("Unknown trigger '{name}'");
            }
        }
        let unfired: HashSet<String> = self
            .nodes()
            .filter(|node| !self.trigger_fired(node.trigger.as_deref(), requested))
            .map(|node| node.name.clone())
            .collect();
        self.retain_nodes(|node| !unfired.contains(&node.name));
        self.check_missing_producers("unfired trigger")
    }

    /// Remove the named nodes (token-conflict skipping). A kept node that
    /// required a removed producer is an error.
    pub fn remove_nodes(&mut self, names: &[String]) -> Result<()> {
        self.retain_nodes(|node| !names.iter().any(|name| name.eq_ignore_ascii_case(&node.name)));
        self.check_missing_producers("token conflict")
    }

    fn check_missing_producers(&self, reason: &str) -> Result<()> {
        // Order-only After references to removed nodes are simply ignored;
        // hard inputs must still resolve.
        for node in self.nodes() {
            for input in &node.inputs {
                if self.tag_producer(input).is_none() {
                    bail!(
                        "Node '{}' requires '{input}', whose producer was removed by a {reason}",
                        node.name
                    );
                }
            }
        }
        Ok(())
    }

    /// Surface buffered diagnostics for the (post-selection) graph.
    ///
    /// Diagnostics whose enclosing trigger was deselected, or has not fired
    /// for this run, stay quiet. Returns an error when any error-severity
    /// diagnostic survives.
    pub fn emit_diagnostics(&self, requested_trigger: Option<&str>) -> Result<()> {
        use colored::Colorize;
        let mut errors = 0usize;
        for diagnostic in &self.diagnostics {
            if let Some(trigger) = &diagnostic.enclosing_trigger {
                if self.trigger(trigger).is_none()
                    || !self.trigger_fired(Some(trigger), requested_trigger)
                {
                    continue;
                }
            }
            match diagnostic.severity {
                Severity::Warning => {
                    eprintln!("{} {}", "warning:".yellow().bold(), diagnostic.message);
                }
                Severity::Error => {
                    eprintln!("{} {}", "error:".red().bold(), diagnostic.message);
                    errors += 1;
                }
            }
        }
        if errors > 0 {
            bail!("{errors} error(s) in graph script");
        }
        Ok(())
    }

    /// Enforce the structural invariants that only hold once the whole
    /// document has been read: acyclicity and trigger containment.
    pub fn validate(&self) -> Result<()> {
        cycle::check_acyclic(self)?;

        // A producer's controlling trigger must enclose each consumer's
        for node in self.nodes() {
            let ancestry: Vec<String> = match &node.trigger {
                Some(trigger) => self.trigger_ancestry(trigger),
                None => Vec::new(),
            };
            for input in &node.inputs {
                let (producer, _) = self
                    .tag_producer(input)
                    .with_context(|| format!("Undefined tag '{input}' required by '{}'", node.name))?;
                if let Some(producer_trigger) = &producer.trigger {
                    let contained = ancestry
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case(producer_trigger));
                    if !contained {
                        bail!(
                            "Node '{}' cannot depend on '{}' behind trigger '{}'",
                            node.name,
                            producer.name,
                            producer_trigger
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Declaration-ordered topological order of the current node set.
    ///
    /// Hard inputs and order-only `After` edges both constrain the order;
    /// ties break by declaration order.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        cycle::topological_order(self)
    }
}
