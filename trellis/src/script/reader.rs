//! Script reader: turns a parsed document into a Graph
//!
//! Processing order for every element: evaluate `If` (a false condition
//! skips the element and its subtree), expand attribute values, validate
//! against the schema, then dispatch. `Agent`, `Trigger`, `ForEach`,
//! `Switch` and macro expansion push a property scope.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::lexer::{self, Element};
use super::schema::Schema;
use crate::condition::{eval_condition, ConditionContext};
use crate::filespec;
use crate::graph::{
    Agent, Diagnostic, Graph, Label, Node, NodeOutput, Report, Severity, TaskInstance, Trigger,
};
use crate::properties::PropertyStack;
use crate::task::TaskRegistry;

/// Everything the reader needs besides the document itself
pub struct ReadOptions<'a> {
    pub registry: &'a TaskRegistry,
    pub schema: &'a Schema,
    /// Workspace root for Exists() and file specs
    pub root_dir: &'a Path,
    /// Host-supplied default properties (branch, changelist, ...)
    pub default_properties: &'a [(String, String)],
    /// `--set Name=Value` overrides
    pub overrides: &'a [(String, String)],
}

/// Read a script file (and its includes) into a Graph
pub fn read_script(path: &Path, opts: &ReadOptions) -> Result<Graph> {
    let mut reader = Reader::new(opts);
    reader.read_file(path)?;
    reader.finish()
}

/// Parse script text directly (used by tests and the preprocess round-trip)
pub fn read_script_text(text: &str, source: &Path, opts: &ReadOptions) -> Result<Graph> {
    let mut reader = Reader::new(opts);
    reader.read_text(text, source)?;
    reader.finish()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Graph,
    Agent,
    Node,
}

struct MacroDef {
    element: Element,
    required: Vec<String>,
    optional: Vec<String>,
}

/// A node while its element is being processed
struct NodeBuilder {
    node: Node,
    /// Tags created by earlier tasks within this node
    local_tags: HashSet<String>,
}

struct Reader<'a> {
    opts: &'a ReadOptions<'a>,
    props: PropertyStack,
    overrides: BTreeMap<String, String>,
    macros: HashMap<String, MacroDef>,
    graph: Graph,
    trigger_stack: Vec<String>,
    current_agent: Option<usize>,
    current_node: Option<NodeBuilder>,
    /// Directory of each file being read, innermost last
    file_stack: Vec<PathBuf>,
}

impl<'a> Reader<'a> {
    fn new(opts: &'a ReadOptions<'a>) -> Self {
        let mut props = PropertyStack::new();
        for (name, value) in opts.default_properties {
            props.set_global(name, value);
        }
        let mut overrides = BTreeMap::new();
        for (name, value) in opts.overrides {
            props.set_global(name, value);
            overrides.insert(name.to_ascii_lowercase(), value.clone());
        }
        Self {
            opts,
            props,
            overrides,
            macros: HashMap::new(),
            graph: Graph::default(),
            trigger_stack: Vec::new(),
            current_agent: None,
            current_node: None,
            file_stack: Vec::new(),
        }
    }

    fn read_file(&mut self, path: &Path) -> Result<()> {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.file_stack.last() {
                Some(dir) => dir.join(path),
                None => self.opts.root_dir.join(path),
            }
        };
        let text = std::fs::read_to_string(&resolved)
            .with_context(|| format!("Failed to read script {}", resolved.display()))?;
        self.read_text(&text, &resolved)
    }

    fn read_text(&mut self, text: &str, source: &Path) -> Result<()> {
        let root = lexer::parse_document(text)
            .with_context(|| format!("Failed to parse {}", source.display()))?;
        if root.name != "BuildGraph" {
            bail!(
                "{}: root element must be <BuildGraph>, found <{}>",
                source.display(),
                root.name
            );
        }
        let dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.opts.root_dir.to_path_buf());
        self.file_stack.push(dir);
        let result = self.process_children(&root, Scope::Graph);
        self.file_stack.pop();
        result
    }

    fn finish(self) -> Result<Graph> {
        let graph = self.graph;
        graph.validate()?;
        Ok(graph)
    }

    // ------------------------------------------------------------ dispatch

    fn process_children(&mut self, parent: &Element, scope: Scope) -> Result<()> {
        for child in &parent.children {
            self.process_element(child, scope)?;
        }
        Ok(())
    }

    fn process_element(&mut self, element: &Element, scope: Scope) -> Result<()> {
        if !self.eval_if(element)? {
            return Ok(());
        }
        let def = self
            .opts
            .schema
            .get(&element.name)
            .with_context(|| format!("line {}: unknown element <{}>", element.line, element.name))?
            .clone();
        let attrs = self.expand_attrs(element)?;
        def.validate_attrs(&attrs)
            .with_context(|| format!("line {}", element.line))?;

        if def.task {
            return self
                .process_task(element, &attrs, scope)
                .with_context(|| format!("line {}: <{}>", element.line, element.name));
        }
        match def.name.as_str() {
            "BuildGraph" => bail!("line {}: <BuildGraph> must be the root", element.line),
            "Include" => self.process_include(element, &attrs, scope),
            "Option" => self.process_option(&attrs, scope),
            "EnvVar" => self.process_env_var(&attrs, scope),
            "Property" => {
                let name = require(&attrs, "Name")?;
                let value = require(&attrs, "Value")?;
                self.props.set(name, value);
                Ok(())
            }
            "Macro" => self.process_macro(element, &attrs),
            "Expand" => self.process_expand(element, &attrs, scope),
            "ForEach" => self.process_for_each(element, &attrs, scope),
            "Switch" => self.process_switch(element, scope),
            "Do" => self.process_children(element, scope),
            "Agent" => self.process_agent(element, &attrs, scope),
            "Trigger" => self.process_trigger(element, &attrs, scope),
            "Node" => self.process_node(element, &attrs, scope),
            "Aggregate" => self.process_aggregate(&attrs, scope),
            "Report" => self.process_report(&attrs, scope),
            "Notify" => self.process_notify(&attrs, scope),
            "Label" => self.process_label(&attrs, scope),
            "Warning" => self.push_diagnostic(Severity::Warning, &attrs),
            "Error" => self.push_diagnostic(Severity::Error, &attrs),
            "Annotation" => self.process_annotation(&attrs, scope),
            "Token" => self.process_token(&attrs, scope),
            "Case" | "Default" => {
                bail!(
                    "line {}: <{}> is only valid inside <Switch>",
                    element.line,
                    element.name
                )
            }
            other => bail!("line {}: unhandled element <{other}>", element.line),
        }
        .with_context(|| format!("line {}: <{}>", element.line, element.name))
    }

    fn eval_if(&mut self, element: &Element) -> Result<bool> {
        let Some(condition) = element.attr("If") else {
            return Ok(true);
        };
        let expanded = self
            .props
            .expand(condition)
            .with_context(|| format!("line {}: <{}> If", element.line, element.name))?;
        let ctx = ConditionContext {
            root_dir: self.opts.root_dir,
        };
        eval_condition(&expanded, &ctx)
            .with_context(|| format!("line {}: <{}> If=\"{condition}\"", element.line, element.name))
    }

    /// Expand all attribute values except `If`
    fn expand_attrs(&self, element: &Element) -> Result<Vec<(String, String)>> {
        let mut attrs = Vec::with_capacity(element.attrs.len());
        for (name, value) in &element.attrs {
            if name.eq_ignore_ascii_case("If") {
                continue;
            }
            let expanded = self
                .props
                .expand(value)
                .with_context(|| format!("line {}: attribute '{name}'", element.line))?;
            attrs.push((name.clone(), expanded));
        }
        Ok(attrs)
    }

    fn enclosing_trigger(&self) -> Option<String> {
        self.trigger_stack.last().cloned()
    }

    // ------------------------------------------------------------ elements

    fn process_include(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        if scope != Scope::Graph {
            bail!("line {}: <Include> is only valid at graph scope", element.line);
        }
        let script = require(attrs, "Script")?;
        if self.file_stack.len() > 16 {
            bail!("Include depth limit exceeded (recursive include of '{script}'?)");
        }
        self.read_file(Path::new(script))
    }

    fn process_option(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Option> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        let default = require(attrs, "DefaultValue")?;
        let value = self
            .overrides
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| default.to_string());
        self.props.set_global(name, &value);
        Ok(())
    }

    fn process_env_var(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<EnvVar> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        let value = match self.overrides.get(&name.to_ascii_lowercase()) {
            Some(value) => value.clone(),
            None => std::env::var(name).unwrap_or_default(),
        };
        self.props.set_global(name, &value);
        Ok(())
    }

    fn process_macro(&mut self, element: &Element, attrs: &[(String, String)]) -> Result<()> {
        let name = require(attrs, "Name")?;
        let key = name.to_ascii_lowercase();
        if self.macros.contains_key(&key) {
            bail!("Macro '{name}' is already defined");
        }
        let required = list(attrs, "Arguments");
        let optional = list(attrs, "OptionalArguments");
        self.macros.insert(
            key,
            MacroDef {
                element: element.clone(),
                required,
                optional,
            },
        );
        Ok(())
    }

    fn process_expand(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        let name = require(attrs, "Name")?;
        let key = name.to_ascii_lowercase();
        let (macro_element, required, optional) = {
            let def = self
                .macros
                .get(&key)
                .with_context(|| format!("Reference to undefined macro '{name}'"))?;
            (def.element.clone(), def.required.clone(), def.optional.clone())
        };

        let mut provided: BTreeMap<String, String> = BTreeMap::new();
        for (attr_name, value) in attrs {
            if attr_name.eq_ignore_ascii_case("Name") {
                continue;
            }
            let declared = required
                .iter()
                .chain(optional.iter())
                .find(|arg| arg.eq_ignore_ascii_case(attr_name));
            match declared {
                Some(arg) => {
                    provided.insert(arg.clone(), value.clone());
                }
                None => bail!("Macro '{name}' has no argument '{attr_name}'"),
            }
        }
        for arg in &required {
            if !provided.contains_key(arg) {
                bail!("Macro '{name}' requires argument '{arg}'");
            }
        }

        self.props.push_scope();
        for arg in required.iter().chain(optional.iter()) {
            let value = provided.get(arg).cloned().unwrap_or_default();
            self.props.set(arg, &value);
        }
        let result = self.process_children(&macro_element, scope);
        self.props.pop_scope();
        result
    }

    fn process_for_each(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        let name = require(attrs, "Name")?;
        let values = require(attrs, "Values")?;
        let separator = get(attrs, "Separator").unwrap_or(";");
        if separator.is_empty() {
            bail!("<ForEach> separator must not be empty");
        }
        let items: Vec<String> = values
            .split(separator)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        for item in items {
            self.props.push_scope();
            self.props.set(name, &item);
            let result = self.process_children(element, scope);
            self.props.pop_scope();
            result?;
        }
        Ok(())
    }

    fn process_switch(&mut self, element: &Element, scope: Scope) -> Result<()> {
        for child in &element.children {
            let taken = match child.name.as_str() {
                "Case" => {
                    let condition = child.attr("If").with_context(|| {
                        format!("line {}: <Case> requires an If attribute", child.line)
                    })?;
                    let expanded = self.props.expand(condition)?;
                    let ctx = ConditionContext {
                        root_dir: self.opts.root_dir,
                    };
                    eval_condition(&expanded, &ctx)
                        .with_context(|| format!("line {}: <Case>", child.line))?
                }
                "Default" => true,
                other => bail!(
                    "line {}: <Switch> may only contain <Case> and <Default>, found <{other}>",
                    child.line
                ),
            };
            if taken {
                self.props.push_scope();
                let result = self.process_children(child, scope);
                self.props.pop_scope();
                return result;
            }
        }
        Ok(())
    }

    fn process_agent(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Agent> cannot be nested inside another agent or node");
        }
        let name = require(attrs, "Name")?;
        if self
            .graph
            .agents
            .iter()
            .any(|agent| agent.name.eq_ignore_ascii_case(name))
        {
            bail!("Agent '{name}' is already defined");
        }
        let types = list(attrs, "Type");
        self.graph.agents.push(Agent {
            name: name.to_string(),
            types,
            trigger: self.enclosing_trigger(),
            nodes: Vec::new(),
        });
        self.current_agent = Some(self.graph.agents.len() - 1);
        self.props.push_scope();
        let result = self.process_children(element, Scope::Agent);
        self.props.pop_scope();
        self.current_agent = None;
        result
    }

    fn process_trigger(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Trigger> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        let parent = self.enclosing_trigger();
        match self.graph.trigger(name) {
            Some(existing) => {
                let same_parent = match (&existing.parent, &parent) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => false,
                };
                if !same_parent {
                    bail!("Trigger '{name}' is already defined under a different parent");
                }
            }
            None => self.graph.triggers.push(Trigger {
                name: name.to_string(),
                parent,
            }),
        }
        self.trigger_stack.push(name.to_string());
        self.props.push_scope();
        let result = self.process_children(element, Scope::Graph);
        self.props.pop_scope();
        self.trigger_stack.pop();
        result
    }

    fn process_node(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        if scope != Scope::Agent {
            bail!("<Node> is only valid inside an <Agent>");
        }
        let agent_index = self.current_agent.context("<Node> outside an agent")?;
        let name = require(attrs, "Name")?;
        if name.is_empty() || name.contains(['#', ';', '+', '/']) {
            bail!("Invalid node name '{name}'");
        }
        if self.graph.node(name).is_some() {
            bail!("Node '{name}' is already defined");
        }
        if self
            .graph
            .aggregates
            .keys()
            .any(|aggregate| aggregate.eq_ignore_ascii_case(name))
        {
            bail!("Node '{name}' collides with an aggregate of the same name");
        }
        let default_tag = format!("#{name}");
        if self.graph.tag_producer(&default_tag).is_some() {
            bail!("Tag '{default_tag}' already has a producer");
        }

        let mut outputs = vec![NodeOutput {
            tag: default_tag,
            node: name.to_string(),
        }];
        for tag in list(attrs, "Produces") {
            filespec::validate_tag_name(&tag)
                .with_context(|| format!("Node '{name}' Produces"))?;
            if self.graph.tag_producer(&tag).is_some()
                || outputs.iter().any(|output| output.tag == tag)
            {
                bail!("Tag '{tag}' already has a producer");
            }
            outputs.push(NodeOutput {
                tag,
                node: name.to_string(),
            });
        }

        // Requires entries resolve to the default outputs of named nodes,
        // or to explicit tags
        let mut inputs: Vec<String> = Vec::new();
        for item in list(attrs, "Requires") {
            if item.starts_with('#') {
                self.graph
                    .tag_producer(&item)
                    .with_context(|| format!("Node '{name}' requires undefined tag '{item}'"))?;
                push_unique(&mut inputs, item);
            } else {
                let members = self
                    .graph
                    .resolve_reference(&item)
                    .with_context(|| format!("Node '{name}' Requires"))?;
                for member in members {
                    push_unique(&mut inputs, format!("#{member}"));
                }
            }
        }

        let mut after: Vec<String> = Vec::new();
        for item in list(attrs, "After") {
            let members = self
                .graph
                .resolve_reference(&item)
                .with_context(|| format!("Node '{name}' After"))?;
            for member in members {
                push_unique(&mut after, member);
            }
        }

        let agent_name = self.graph.agents[agent_index].name.clone();
        let builder = NodeBuilder {
            node: Node {
                name: name.to_string(),
                agent: agent_name,
                trigger: self.enclosing_trigger(),
                outputs,
                inputs,
                after,
                tasks: Vec::new(),
                tokens: Vec::new(),
                notify: Vec::new(),
                notify_on_warnings: true,
                annotations: BTreeMap::new(),
            },
            local_tags: HashSet::new(),
        };
        self.current_node = Some(builder);
        let result = self.process_children(element, Scope::Node);
        let builder = self.current_node.take();
        result?;
        let builder = builder.context("node builder missing")?;
        self.graph.agents[agent_index].nodes.push(builder.node);
        Ok(())
    }

    fn process_task(
        &mut self,
        element: &Element,
        attrs: &[(String, String)],
        scope: Scope,
    ) -> Result<()> {
        if scope != Scope::Node {
            bail!("Task <{}> is only valid inside a <Node>", element.name);
        }
        let (task, params) = self.opts.registry.instantiate(&element.name, attrs)?;
        if !element.children.is_empty() {
            bail!("Task <{}> cannot have child elements", element.name);
        }

        let consumed = task.consumed_tags();
        let produced = task.produced_tags();
        {
            // Split borrow: look at the graph first, then mutate the builder
            let builder = self.current_node.as_ref().context("task outside a node")?;
            for tag in &produced {
                if let Some((producer, _)) = self.graph.tag_producer(tag) {
                    if !producer.name.eq_ignore_ascii_case(&builder.node.name) {
                        bail!(
                            "Tag '{tag}' is produced by node '{}' and cannot be written here",
                            producer.name
                        );
                    }
                }
            }
        }

        let mut new_inputs: Vec<String> = Vec::new();
        {
            let builder = self.current_node.as_ref().context("task outside a node")?;
            for tag in &consumed {
                if builder.node.output(tag).is_some()
                    || builder.local_tags.contains(tag)
                    || builder.node.inputs.contains(tag)
                {
                    continue;
                }
                match self.graph.tag_producer(tag) {
                    Some(_) => new_inputs.push(tag.clone()),
                    None => bail!(
                        "Task <{}> references undefined tag '{tag}'",
                        element.name
                    ),
                }
            }
        }

        let builder = self.current_node.as_mut().context("task outside a node")?;
        for input in new_inputs {
            push_unique(&mut builder.node.inputs, input);
        }
        for tag in produced {
            builder.local_tags.insert(tag);
        }
        builder.node.tasks.push(TaskInstance {
            name: element.name.clone(),
            attrs: attrs.to_vec(),
            params,
            task,
        });
        Ok(())
    }

    fn process_aggregate(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Aggregate> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        if self.graph.node(name).is_some()
            || self
                .graph
                .aggregates
                .keys()
                .any(|aggregate| aggregate.eq_ignore_ascii_case(name))
        {
            bail!("Aggregate '{name}' collides with an existing node or aggregate");
        }
        let mut members = Vec::new();
        for item in list(attrs, "Requires") {
            for member in self
                .graph
                .resolve_reference(&item)
                .with_context(|| format!("Aggregate '{name}'"))?
            {
                push_unique(&mut members, member);
            }
        }
        self.graph.aggregates.insert(name.to_string(), members);
        Ok(())
    }

    fn process_report(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Report> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        if self.graph.reports.contains_key(name) {
            bail!("Report '{name}' is already defined");
        }
        let mut nodes = Vec::new();
        for item in list(attrs, "Requires") {
            for member in self
                .graph
                .resolve_reference(&item)
                .with_context(|| format!("Report '{name}'"))?
            {
                push_unique(&mut nodes, member);
            }
        }
        self.graph.reports.insert(
            name.to_string(),
            Report {
                name: name.to_string(),
                nodes,
            },
        );
        Ok(())
    }

    fn process_notify(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Notify> is only valid at graph scope");
        }
        let targets = require(attrs, "Targets")?;
        let users = list(attrs, "Users");
        let warnings = match get(attrs, "Warnings") {
            Some(value) => Some(parse_bool(value).context("<Notify> Warnings")?),
            None => None,
        };
        let mut nodes: Vec<String> = Vec::new();
        for item in filespec::split_list(targets) {
            for member in self.graph.resolve_reference(item).context("<Notify> Targets")? {
                push_unique(&mut nodes, member);
            }
        }
        for node_name in nodes {
            let node = self
                .graph
                .node_mut(&node_name)
                .with_context(|| format!("Unknown node '{node_name}'"))?;
            for user in &users {
                if !node.notify.iter().any(|existing| existing == user) {
                    node.notify.push(user.clone());
                }
            }
            if let Some(warnings) = warnings {
                node.notify_on_warnings = warnings;
            }
        }
        Ok(())
    }

    fn process_label(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Graph {
            bail!("<Label> is only valid at graph scope");
        }
        let name = require(attrs, "Name")?;
        let mut nodes = Vec::new();
        for item in list(attrs, "Requires") {
            for member in self
                .graph
                .resolve_reference(&item)
                .with_context(|| format!("Label '{name}'"))?
            {
                push_unique(&mut nodes, member);
            }
        }
        self.graph.labels.push(Label {
            name: name.to_string(),
            category: get(attrs, "Category").map(str::to_string),
            nodes,
        });
        Ok(())
    }

    fn push_diagnostic(&mut self, severity: Severity, attrs: &[(String, String)]) -> Result<()> {
        let message = require(attrs, "Message")?;
        self.graph.diagnostics.push(Diagnostic {
            severity,
            message: message.to_string(),
            enclosing_trigger: self.enclosing_trigger(),
        });
        Ok(())
    }

    fn process_annotation(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Node {
            bail!("<Annotation> is only valid inside a <Node>");
        }
        let name = require(attrs, "Name")?;
        let value = require(attrs, "Value")?;
        let builder = self.current_node.as_mut().context("annotation outside a node")?;
        builder
            .node
            .annotations
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn process_token(&mut self, attrs: &[(String, String)], scope: Scope) -> Result<()> {
        if scope != Scope::Node {
            bail!("<Token> is only valid inside a <Node>");
        }
        let path = require(attrs, "Path")?;
        let resolved = {
            let candidate = PathBuf::from(path);
            if candidate.is_absolute() {
                candidate
            } else {
                self.opts.root_dir.join(candidate)
            }
        };
        let builder = self.current_node.as_mut().context("token outside a node")?;
        if !builder.node.tokens.contains(&resolved) {
            builder.node.tokens.push(resolved);
        }
        Ok(())
    }
}

// ------------------------------------------------------------ helpers

fn get<'e>(attrs: &'e [(String, String)], name: &str) -> Option<&'e str> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn require<'e>(attrs: &'e [(String, String)], name: &str) -> Result<&'e str> {
    get(attrs, name).with_context(|| format!("Missing required attribute '{name}'"))
}

fn list(attrs: &[(String, String)], name: &str) -> Vec<String> {
    get(attrs, name)
        .map(|value| {
            filespec::split_list(value)
                .into_iter()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected true or false, got '{value}'"),
    }
}

fn push_unique(list: &mut Vec<String>, value: impl Into<String>) {
    let value = value.into();
    if !list.contains(&value) {
        list.push(value);
    }
}
