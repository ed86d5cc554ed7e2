//! Shader program templates and macro definition sets
//!
//! A [`ProgramTemplate`] is source text compiled into concrete variants by
//! prepending macro definitions. A [`MacroSet`] is the canonical form of one
//! variant's definitions; its string form doubles as the program cache key,
//! so it is kept sorted and deterministic.

use std::collections::BTreeMap;

/// An ordered set of preprocessor definitions for one program variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroSet {
    defines: BTreeMap<String, Option<i32>>,
}

impl MacroSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name` with no value
    pub fn define(&mut self, name: impl Into<String>) {
        self.defines.insert(name.into(), None);
    }

    /// Define `name` with an integer value
    pub fn define_value(&mut self, name: impl Into<String>, value: i32) {
        self.defines.insert(name.into(), Some(value));
    }

    /// Whether `name` is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Canonical `NAME` / `NAME=value` list, sorted, `;`-separated
    ///
    /// Equal sets always produce equal strings, making this usable as a
    /// cache key for compiled variants.
    pub fn defines_string(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.defines {
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(name);
            if let Some(value) = value {
                out.push('=');
                out.push_str(&value.to_string());
            }
        }
        out
    }
}

/// Named shader source pair compiled per macro variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTemplate {
    /// Template name, unique within an effect
    pub name: String,
    /// Vertex stage source
    pub vertex_source: String,
    /// Fragment stage source
    pub fragment_source: String,
}

impl ProgramTemplate {
    /// Create a template from name and stage sources
    pub fn new(
        name: impl Into<String>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
        }
    }

    /// Cache key for the variant of this template under `macros`
    pub fn variant_key(&self, macros: &MacroSet) -> String {
        format!("{}|{}", self.name, macros.defines_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_string_is_sorted_and_canonical() {
        let mut a = MacroSet::new();
        a.define("HAS_NORMALS");
        a.define_value("NUM_DIRECTIONAL_LIGHTS", 2);

        let mut b = MacroSet::new();
        b.define_value("NUM_DIRECTIONAL_LIGHTS", 2);
        b.define("HAS_NORMALS");

        assert_eq!(a.defines_string(), "HAS_NORMALS;NUM_DIRECTIONAL_LIGHTS=2");
        assert_eq!(a.defines_string(), b.defines_string());
    }

    #[test]
    fn test_variant_key_distinguishes_defines() {
        let template = ProgramTemplate::new("phong", "vs", "fs");
        let empty = MacroSet::new();
        let mut lit = MacroSet::new();
        lit.define_value("NUM_DIRECTIONAL_LIGHTS", 1);

        assert_ne!(template.variant_key(&empty), template.variant_key(&lit));
    }

    #[test]
    fn test_redefine_overwrites_value() {
        let mut set = MacroSet::new();
        set.define_value("N", 1);
        set.define_value("N", 3);
        assert_eq!(set.defines_string(), "N=3");
    }
}
