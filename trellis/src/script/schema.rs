//! Element vocabulary for graph scripts
//!
//! The schema is built at startup from the structural elements plus one
//! element per registered task. The reader uses it to reject unknown
//! elements and attributes; `--schema` serializes it as JSON.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::task::TaskRegistry;

/// One legal attribute on an element
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttrDef {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub required: bool,
}

/// One legal element
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElementDef {
    pub name: String,
    pub attributes: Vec<AttrDef>,
    /// Accepts attributes beyond the declared ones (macro expansion args)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub open_attributes: bool,
    /// Element instantiates a registered task
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub task: bool,
}

impl ElementDef {
    /// Check attribute names against the definition. `If` is legal anywhere.
    pub fn validate_attrs(&self, attrs: &[(String, String)]) -> Result<()> {
        if self.open_attributes {
            return Ok(());
        }
        for (name, _) in attrs {
            if name.eq_ignore_ascii_case("If") {
                continue;
            }
            if !self
                .attributes
                .iter()
                .any(|attr| attr.name.eq_ignore_ascii_case(name))
            {
                bail!("Element <{}> has no attribute '{}'", self.name, name);
            }
        }
        for attr in &self.attributes {
            if attr.required
                && !attrs.iter().any(|(name, _)| name.eq_ignore_ascii_case(&attr.name))
            {
                bail!("Element <{}> requires attribute '{}'", self.name, attr.name);
            }
        }
        Ok(())
    }
}

/// The full element vocabulary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Schema {
    elements: BTreeMap<String, ElementDef>,
}

fn attr(name: &str, kind: &str, required: bool) -> AttrDef {
    AttrDef {
        name: name.to_string(),
        kind: kind.to_string(),
        required,
    }
}

fn element(name: &str, attributes: Vec<AttrDef>) -> ElementDef {
    ElementDef {
        name: name.to_string(),
        attributes,
        open_attributes: false,
        task: false,
    }
}

impl Schema {
    /// Build the vocabulary from the structural elements and the registry
    pub fn build(registry: &TaskRegistry) -> Self {
        let mut elements = BTreeMap::new();
        let structural = vec![
            element("BuildGraph", vec![]),
            element("Include", vec![attr("Script", "Path", true)]),
            element(
                "Option",
                vec![
                    attr("Name", "Name", true),
                    attr("Description", "String", false),
                    attr("DefaultValue", "String", true),
                ],
            ),
            element("EnvVar", vec![attr("Name", "Name", true)]),
            element(
                "Property",
                vec![attr("Name", "Name", true), attr("Value", "String", true)],
            ),
            element(
                "Macro",
                vec![
                    attr("Name", "Name", true),
                    attr("Arguments", "StringList", false),
                    attr("OptionalArguments", "StringList", false),
                ],
            ),
            ElementDef {
                name: "Expand".to_string(),
                attributes: vec![attr("Name", "Name", true)],
                open_attributes: true,
                task: false,
            },
            element(
                "Agent",
                vec![attr("Name", "Name", true), attr("Type", "StringList", false)],
            ),
            element(
                "Node",
                vec![
                    attr("Name", "Name", true),
                    attr("Requires", "TagList", false),
                    attr("Produces", "TagList", false),
                    attr("After", "TagList", false),
                ],
            ),
            element(
                "Aggregate",
                vec![attr("Name", "Name", true), attr("Requires", "TagList", true)],
            ),
            element(
                "Report",
                vec![attr("Name", "Name", true), attr("Requires", "TagList", true)],
            ),
            element(
                "Notify",
                vec![
                    attr("Targets", "TagList", true),
                    attr("Users", "StringList", true),
                    attr("Warnings", "Bool", false),
                ],
            ),
            element("Trigger", vec![attr("Name", "Name", true)]),
            element(
                "Label",
                vec![
                    attr("Name", "Name", true),
                    attr("Category", "String", false),
                    attr("Requires", "TagList", true),
                ],
            ),
            element("Warning", vec![attr("Message", "String", true)]),
            element("Error", vec![attr("Message", "String", true)]),
            element("Do", vec![]),
            element(
                "ForEach",
                vec![
                    attr("Name", "Name", true),
                    attr("Values", "StringList", true),
                    attr("Separator", "String", false),
                ],
            ),
            element("Switch", vec![]),
            element("Case", vec![attr("If", "Condition", true)]),
            element("Default", vec![]),
            element(
                "Annotation",
                vec![attr("Name", "Name", true), attr("Value", "String", true)],
            ),
            element("Token", vec![attr("Path", "Path", true)]),
        ];
        for def in structural {
            elements.insert(def.name.clone(), def);
        }

        for descriptor in registry.descriptors() {
            let attributes = descriptor
                .params
                .iter()
                .map(|param| attr(param.name, &param.kind.to_string(), !param.optional))
                .collect();
            elements.insert(
                descriptor.name.to_string(),
                ElementDef {
                    name: descriptor.name.to_string(),
                    attributes,
                    open_attributes: false,
                    task: true,
                },
            );
        }

        Self { elements }
    }

    /// Look up an element definition by name
    pub fn get(&self, name: &str) -> Option<&ElementDef> {
        self.elements.get(name)
    }

    /// Write the vocabulary as JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
