//! Task vocabulary: registry, parameter schema and attribute binding
//!
//! Tasks are registered explicitly at startup. Each descriptor carries the
//! element name, its parameter schema and a constructor; the reader binds
//! attribute strings to typed values through the schema and instantiates the
//! task. The engine only ever sees the `Task` trait.

mod builtin;
pub mod docs;

pub use builtin::register_builtin_tasks;

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::filespec::{self, FileSet, TagSetMap};

/// Underlying kind of a task parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Bool,
    Int,
    /// One of a fixed set of values
    Enum(&'static [&'static str]),
    /// Semicolon-separated list of strings
    StringList,
    /// File spec resolved against the workspace and tag map at execution time
    FileSpec,
    /// Single `#Tag` reference
    TagRef,
    /// Semicolon-separated list of `#Tag` references
    TagList,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::String => write!(f, "String"),
            ParamKind::Bool => write!(f, "Bool"),
            ParamKind::Int => write!(f, "Int"),
            ParamKind::Enum(values) => write!(f, "Enum({})", values.join("|")),
            ParamKind::StringList => write!(f, "StringList"),
            ParamKind::FileSpec => write!(f, "FileSpec"),
            ParamKind::TagRef => write!(f, "TagRef"),
            ParamKind::TagList => write!(f, "TagList"),
        }
    }
}

/// Schema entry for one task parameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub optional: bool,
    pub description: &'static str,
}

/// A bound parameter value (tagged union; see ParamKind)
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Bool(bool),
    Int(i64),
    StringList(Vec<String>),
    FileSpec(String),
    TagRef(String),
    TagList(Vec<String>),
}

/// Convert one attribute string to the parameter's kind.
///
/// A failed conversion is a validation error naming the parameter.
fn bind_value(spec: &ParamSpec, raw: &str) -> Result<ParamValue> {
    match &spec.kind {
        ParamKind::String => Ok(ParamValue::String(raw.to_string())),
        ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(ParamValue::Bool(true)),
            "false" => Ok(ParamValue::Bool(false)),
            _ => bail!("Parameter '{}': expected true or false, got '{raw}'", spec.name),
        },
        ParamKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(ParamValue::Int)
            .with_context(|| format!("Parameter '{}': expected an integer, got '{raw}'", spec.name)),
        ParamKind::Enum(values) => {
            let matched = values.iter().find(|v| v.eq_ignore_ascii_case(raw));
            match matched {
                Some(v) => Ok(ParamValue::String(v.to_string())),
                None => bail!(
                    "Parameter '{}': '{raw}' is not one of {}",
                    spec.name,
                    values.join(", ")
                ),
            }
        }
        ParamKind::StringList => Ok(ParamValue::StringList(
            filespec::split_list(raw).into_iter().map(str::to_string).collect(),
        )),
        ParamKind::FileSpec => Ok(ParamValue::FileSpec(raw.to_string())),
        ParamKind::TagRef => {
            filespec::validate_tag_name(raw)
                .with_context(|| format!("Parameter '{}'", spec.name))?;
            Ok(ParamValue::TagRef(raw.to_string()))
        }
        ParamKind::TagList => {
            let tags: Vec<String> = filespec::split_list(raw)
                .into_iter()
                .map(str::to_string)
                .collect();
            for tag in &tags {
                filespec::validate_tag_name(tag)
                    .with_context(|| format!("Parameter '{}'", spec.name))?;
            }
            Ok(ParamValue::TagList(tags))
        }
    }
}

/// Parameters bound for one task instance
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    values: BTreeMap<String, ParamValue>,
}

impl BoundParams {
    /// Bind expanded attribute strings against a parameter schema.
    ///
    /// Unknown attributes and missing required parameters are errors.
    pub fn bind(params: &[ParamSpec], attrs: &[(String, String)]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (name, raw) in attrs {
            let spec = params
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .with_context(|| format!("Unknown attribute '{name}'"))?;
            values.insert(spec.name.to_string(), bind_value(spec, raw)?);
        }
        for spec in params {
            if !spec.optional && !values.contains_key(spec.name) {
                bail!("Missing required attribute '{}'", spec.name);
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn require_string(&self, name: &str) -> Result<&str> {
        self.string(name)
            .with_context(|| format!("Missing required attribute '{name}'"))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        match self.values.get(name) {
            Some(ParamValue::Int(i)) => *i,
            _ => default,
        }
    }

    pub fn file_spec(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::FileSpec(s)) => Some(s),
            _ => None,
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::TagRef(s)) => Some(s),
            _ => None,
        }
    }

    /// Every tag referenced by any bound parameter (tag-ref, tag-list and
    /// tags embedded in file specs). Used to compute node inputs.
    pub fn referenced_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for value in self.values.values() {
            match value {
                ParamValue::TagRef(tag) => tags.push(tag.clone()),
                ParamValue::TagList(list) => tags.extend(list.iter().cloned()),
                ParamValue::FileSpec(spec) => tags.extend(filespec::tags_in_spec(spec)),
                _ => {}
            }
        }
        tags
    }
}

/// Mutable state handed to a task while it executes.
///
/// All tag-map access happens inside `Task::execute`; the call is
/// synchronous and the engine owns the map before and after.
pub struct TaskContext<'a> {
    /// Workspace root; file specs resolve against it
    pub root_dir: &'a Path,
    /// Tag name → file set, seeded with this node's inputs and outputs
    pub tags: &'a mut TagSetMap,
    /// Everything this node has produced so far, tagged or not
    pub build_products: &'a mut FileSet,
}

impl TaskContext<'_> {
    /// Resolve a file spec against the workspace and the current tag map
    pub fn resolve_spec(&self, spec: &str) -> Result<FileSet> {
        filespec::resolve(spec, self.root_dir, self.tags)
    }

    /// Record files into a tag, creating the tag set on demand
    pub fn add_to_tag(&mut self, tag: &str, files: &FileSet) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .extend(files.iter().cloned());
    }

    /// Record files as build products of the current node
    pub fn add_build_products(&mut self, files: &FileSet) {
        self.build_products.extend(files.iter().cloned());
    }
}

/// One executable unit within a node.
///
/// Implementations read and write tag entries only during `execute`; tag
/// enumeration lets the reader compute cross-node inputs without running
/// anything.
pub trait Task {
    /// Run the task against the mutable tag map. An error fails the node.
    fn execute(&self, ctx: &mut TaskContext) -> Result<()>;

    /// Tags this task reads
    fn consumed_tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Tags this task writes
    fn produced_tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Metadata and constructor for one registered task kind
pub struct TaskDescriptor {
    /// Element name in the script
    pub name: &'static str,
    pub description: &'static str,
    /// Restricted tasks are dropped from the registry by --public-tasks-only
    pub restricted: bool,
    pub params: Vec<ParamSpec>,
    pub construct: fn(&BoundParams) -> Result<Box<dyn Task>>,
}

/// Explicit name → descriptor registry, populated at startup
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskDescriptor>,
}

impl TaskRegistry {
    /// Registry containing the built-in task set
    pub fn with_builtin_tasks() -> Self {
        let mut registry = Self::default();
        register_builtin_tasks(&mut registry);
        registry
    }

    pub fn register(&mut self, descriptor: TaskDescriptor) {
        debug_assert!(
            !self.tasks.contains_key(descriptor.name),
            "duplicate task registration"
        );
        self.tasks.insert(descriptor.name.to_string(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values()
    }

    /// Drop restricted tasks (--public-tasks-only)
    pub fn retain_public(&mut self) {
        self.tasks.retain(|_, descriptor| !descriptor.restricted);
    }

    /// Bind attributes and construct a task instance
    pub fn instantiate(
        &self,
        name: &str,
        attrs: &[(String, String)],
    ) -> Result<(Box<dyn Task>, BoundParams)> {
        let descriptor = self
            .get(name)
            .with_context(|| format!("Unknown task '{name}'"))?;
        let params = BoundParams::bind(&descriptor.params, attrs)
            .with_context(|| format!("Invalid parameters for task '{name}'"))?;
        let task = (descriptor.construct)(&params)?;
        Ok((task, params))
    }
}
