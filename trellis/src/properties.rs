//! Property environment with `$(Name)` macro expansion
//!
//! Properties are case-insensitive name/value pairs layered in scopes.
//! `ForEach`, `Expand` and similar script constructs push a scope; writes go
//! to the innermost scope and reads walk outward.

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Layered property environment.
///
/// Lookup order is innermost scope first. Names are case-insensitive; the
/// key is stored lowercased.
#[derive(Debug, Clone)]
pub struct PropertyStack {
    scopes: Vec<HashMap<String, String>>,
}

impl Default for PropertyStack {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStack {
    /// Create a stack with a single global scope
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    /// Push a fresh scope (used by ForEach iterations and macro expansion)
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope
    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the global scope");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Set a property in the innermost scope
    pub fn set(&mut self, name: &str, value: &str) {
        let scope = self.scopes.last_mut().unwrap();
        scope.insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Set a property in the global scope, regardless of nesting.
    ///
    /// Used for default properties, `Option` and `EnvVar` imports, which are
    /// document-wide.
    pub fn set_global(&mut self, name: &str, value: &str) {
        let scope = self.scopes.first_mut().unwrap();
        scope.insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Look up a property, innermost scope first
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&key).map(String::as_str))
    }

    /// Whether a property is defined in any scope
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Expand every `$(Name)` reference in `text`.
    ///
    /// Substituted values are re-scanned, so properties may reference other
    /// properties. Unknown names expand to the empty string. A property that
    /// expands through itself is an error rather than an infinite loop.
    pub fn expand(&self, text: &str) -> Result<String> {
        let mut active = Vec::new();
        self.expand_guarded(text, &mut active)
    }

    fn expand_guarded(&self, text: &str, active: &mut Vec<String>) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = match after.find(')') {
                Some(end) => end,
                None => bail!("Unterminated property reference in '{text}'"),
            };
            let name = &after[..end];
            let key = name.to_ascii_lowercase();
            if active.contains(&key) {
                bail!("Self-referential expansion of property '{name}'");
            }
            let value = self.get(name).unwrap_or("").to_string();
            active.push(key);
            out.push_str(&self.expand_guarded(&value, active)?);
            active.pop();
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
