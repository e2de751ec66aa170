//! Definition registry for storing and classifying component templates

use std::collections::HashMap;

use super::types::{ComponentDefinition, PortDef};
use crate::error::{find_similar, ElabError};

/// Type names with fixed timing semantics
pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";
pub const REGISTER: &str = "reg";

/// Registry of named component templates
///
/// Holds templates only: it performs no instantiation and no cross-reference
/// validation. One registry belongs to one compile unit.
#[derive(Debug, Clone)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, ComponentDefinition>,
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionRegistry {
    /// Create a registry preloaded with the builtin primitives
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for (name, def) in builtin_definitions() {
            registry.definitions.insert(name.to_string(), def);
        }
        registry
    }

    /// Create a registry with no definitions at all
    pub fn empty() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Register a definition, silently replacing any previous one
    ///
    /// The replaced definition is returned and a warning is logged so the
    /// overwrite stays diagnosable.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        definition: ComponentDefinition,
    ) -> Option<ComponentDefinition> {
        let type_name = type_name.into();
        let previous = self.definitions.insert(type_name.clone(), definition);
        if previous.is_some() {
            tracing::warn!(type_name = %type_name, "definition re-registered; previous one replaced");
        } else {
            tracing::debug!(type_name = %type_name, "definition registered");
        }
        previous
    }

    /// Get a definition by type name
    pub fn get(&self, type_name: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(type_name)
    }

    /// Get a definition or a `DefinitionNotFound` error with suggestions
    pub fn lookup(&self, type_name: &str) -> Result<&ComponentDefinition, ElabError> {
        self.get(type_name).ok_or_else(|| {
            ElabError::not_found(type_name, find_similar(self.names(), type_name, 2))
        })
    }

    pub fn is_primitive(&self, type_name: &str) -> bool {
        self.get(type_name).is_some_and(|d| d.is_primitive)
    }

    pub fn is_module(&self, type_name: &str) -> bool {
        self.get(type_name).is_some_and(|d| !d.is_primitive)
    }

    /// All registered type names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.into_iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// The fixed builtin primitive set
///
/// `input`, `output` and `reg` carry a `WIDTH` parameter so that vector
/// signals can enter, leave and be delayed.
pub fn builtin_definitions() -> Vec<(&'static str, ComponentDefinition)> {
    let binary = || {
        ComponentDefinition::primitive(
            vec![PortDef::new("a"), PortDef::new("b")],
            vec![PortDef::new("out")],
            Some(1),
        )
    };
    let unary = || {
        ComponentDefinition::primitive(vec![PortDef::new("in")], vec![PortDef::new("out")], Some(1))
    };

    vec![
        ("add", binary()),
        ("mul", binary()),
        ("relu2", unary()),
        (
            "clamp",
            unary()
                .with_parameter("MIN", -1i64)
                .with_parameter("MAX", 1i64),
        ),
        (
            REGISTER,
            ComponentDefinition::primitive(
                vec![PortDef::new("in").with_size("${WIDTH}")],
                vec![PortDef::new("out").with_size("${WIDTH}")],
                Some(1),
            )
            .with_parameter("WIDTH", 1i64),
        ),
        (
            INPUT,
            ComponentDefinition::primitive(
                vec![],
                vec![PortDef::new("out").with_size("${WIDTH}")],
                Some(0),
            )
            .with_parameter("WIDTH", 1i64),
        ),
        (
            OUTPUT,
            ComponentDefinition::primitive(
                vec![PortDef::new("in").with_size("${WIDTH}")],
                vec![],
                Some(0),
            )
            .with_parameter("WIDTH", 1i64),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_preloaded() {
        let registry = DefinitionRegistry::new();
        for name in ["add", "mul", "relu2", "clamp", "reg", "input", "output"] {
            assert!(registry.is_primitive(name), "{} should be a primitive", name);
        }
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_io_primitives_have_no_opposite_ports() {
        let registry = DefinitionRegistry::new();
        assert!(registry.get("input").unwrap().inputs.is_empty());
        assert!(registry.get("output").unwrap().outputs.is_empty());
    }

    #[test]
    fn test_register_overwrites_and_returns_previous() {
        let mut registry = DefinitionRegistry::new();
        let custom = ComponentDefinition::primitive(vec![], vec![PortDef::new("y")], Some(4));
        let previous = registry.register("mul", custom.clone());
        assert!(previous.is_some());
        assert_eq!(registry.get("mul"), Some(&custom));
    }

    #[test]
    fn test_module_classification() {
        let mut registry = DefinitionRegistry::empty();
        registry.register("mac", ComponentDefinition::module(vec![], vec![]));
        assert!(registry.is_module("mac"));
        assert!(!registry.is_primitive("mac"));
        assert!(!registry.is_module("missing"));
    }

    #[test]
    fn test_lookup_suggests_close_names() {
        let registry = DefinitionRegistry::new();
        match registry.lookup("mull") {
            Err(ElabError::DefinitionNotFound { suggestions, .. }) => {
                assert_eq!(suggestions.first().map(String::as_str), Some("mul"));
            }
            other => panic!("expected DefinitionNotFound, got {:?}", other),
        }
    }
}
