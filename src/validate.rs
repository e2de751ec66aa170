//! Defensive pre-check of a circuit document
//!
//! Catches what can be decided from literal text alone: unknown types,
//! duplicate ids, malformed references and mappings to undeclared ports.
//! Only modules reachable from the entry point through literal component
//! types are checked. Loop bodies and anything templated are left for
//! elaboration, which reports the same error variants, so running this
//! first never changes the outcome.

use std::collections::{HashSet, VecDeque};

use crate::definition::{CircuitDocument, ComponentDefinition, DefinitionRegistry};
use crate::elaborate::ConnectionReference;
use crate::error::{find_similar, ElabError};
use crate::expr::Value;

/// Validate the entry point and every module it reaches
pub fn validate_document(doc: &CircuitDocument, registry: &DefinitionRegistry) -> Result<(), ElabError> {
    if !doc.modules.contains_key(&doc.entry) {
        return Err(ElabError::not_found(
            doc.entry.as_str(),
            find_similar(doc.modules.keys().map(String::as_str), &doc.entry, 2),
        ));
    }
    validate_definitions(doc, registry, &doc.entry)
}

/// Validate `entry` and the modules it instantiates by literal type name
///
/// An `entry` that is not a document module is left for elaboration to
/// report.
pub fn validate_definitions(
    doc: &CircuitDocument,
    registry: &DefinitionRegistry,
    entry: &str,
) -> Result<(), ElabError> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        let Some(def) = doc.modules.get(name) else {
            continue;
        };
        validate_module(name, def, registry)?;
        queue.extend(
            def.components
                .iter()
                .map(|c| c.type_name.as_str())
                .filter(|t| is_literal(t) && doc.modules.contains_key(*t)),
        );
    }
    Ok(())
}

fn is_literal(text: &str) -> bool {
    !Value::from(text).is_templated()
}

fn validate_module(
    name: &str,
    def: &ComponentDefinition,
    registry: &DefinitionRegistry,
) -> Result<(), ElabError> {
    for component in &def.components {
        if is_literal(&component.type_name) {
            registry.lookup(&component.type_name)?;
        }
    }

    let mut ids = HashSet::new();
    for component in &def.components {
        if is_literal(&component.id) && !ids.insert(component.id.as_str()) {
            return Err(ElabError::duplicate(name, component.id.as_str()));
        }
    }

    // Loop or templated ids make the sibling set unknowable before elaboration
    let siblings_known = def.component_loops.is_empty() && ids.len() == def.components.len();

    let check = |raw: &str| -> Result<(), ElabError> {
        if !is_literal(raw) {
            return Ok(());
        }
        let reference = ConnectionReference::parse(raw)
            .map_err(|reason| ElabError::invalid_reference(name, raw, reason))?;
        match &reference {
            ConnectionReference::ModuleInput { name: port, .. } => {
                if def.input(port).is_none() {
                    return Err(ElabError::invalid_reference(
                        name,
                        raw,
                        format!("enclosing module has no input port '{}'", port),
                    ));
                }
            }
            ConnectionReference::ComponentOutput { component_id, .. } => {
                if siblings_known && !ids.contains(component_id.as_str()) {
                    return Err(ElabError::invalid_reference(
                        name,
                        raw,
                        format!("no component '{}' in this module", component_id),
                    ));
                }
            }
        }
        Ok(())
    };

    for component in &def.components {
        for binding in component.inputs.values() {
            for raw in binding.parts() {
                check(raw)?;
            }
        }
    }

    for (port, raw) in &def.output_mappings {
        if def.output(port).is_none() {
            return Err(ElabError::invalid_reference(
                name,
                port.as_str(),
                "output mapping names no output port of the module",
            ));
        }
        check(raw)?;
    }

    tracing::trace!(module = name, components = def.components.len(), "module validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(json: &str) -> Result<(), ElabError> {
        let doc = CircuitDocument::from_json(json).unwrap();
        let registry = doc.registry().unwrap();
        validate_document(&doc, &registry)
    }

    #[test]
    fn test_valid_document() {
        let json = r#"{
            "entry": "top",
            "modules": {"top": {
                "inputs": [{"name": "x"}],
                "outputs": [{"name": "y"}],
                "components": [{"id": "r", "type": "reg", "inputs": {"in": "$.x"}}],
                "outputMappings": {"y": "r.out"}
            }}
        }"#;
        assert!(check(json).is_ok());
    }

    #[test]
    fn test_missing_entry() {
        let err = check(r#"{"entry": "tpo", "modules": {"top": {}}}"#).unwrap_err();
        assert_eq!(err, ElabError::not_found("tpo", vec!["top".into()]));
    }

    #[test]
    fn test_unknown_literal_type() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "components": [{"id": "a", "type": "mull"}]
        }}}"#;
        assert!(matches!(check(json), Err(ElabError::DefinitionNotFound { .. })));
    }

    #[test]
    fn test_duplicate_literal_id() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "components": [{"id": "a", "type": "reg"}, {"id": "a", "type": "mul"}]
        }}}"#;
        assert_eq!(check(json).unwrap_err(), ElabError::duplicate("top", "a"));
    }

    #[test]
    fn test_unknown_module_input() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "inputs": [{"name": "x"}],
            "components": [{"id": "a", "type": "reg", "inputs": {"in": "$.z"}}]
        }}}"#;
        assert!(matches!(check(json), Err(ElabError::InvalidReference { .. })));
    }

    #[test]
    fn test_templated_references_deferred() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "inputs": [{"name": "x"}],
            "componentLoops": [{"iterator": "i", "range": [0, 1], "components": [
                {"id": "r_${i}", "type": "reg", "inputs": {"in": "${i == 0 ? '$.x' : 'r_0.out'}"}}
            ]}]
        }}}"#;
        assert!(check(json).is_ok());
    }

    #[test]
    fn test_mapping_to_undeclared_output() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "outputs": [{"name": "y"}],
            "outputMappings": {"z": "$.x"}
        }}}"#;
        assert!(matches!(check(json), Err(ElabError::InvalidReference { .. })));
    }

    #[test]
    fn test_unreachable_module_not_checked() {
        let json = r#"{"entry": "top", "modules": {
            "top": {"components": [{"id": "r", "type": "reg"}]},
            "scratch": {"components": [{"id": "n", "type": "nosuch"}]}
        }}"#;
        assert!(check(json).is_ok());
    }

    #[test]
    fn test_reachable_submodule_checked() {
        let json = r#"{"entry": "top", "modules": {
            "top": {"components": [{"id": "s", "type": "sub"}]},
            "sub": {"components": [{"id": "n", "type": "nosuch"}]}
        }}"#;
        assert!(matches!(check(json), Err(ElabError::DefinitionNotFound { .. })));
    }

    #[test]
    fn test_loop_bodies_left_to_elaboration() {
        let json = r#"{"entry": "top", "modules": {"top": {
            "componentLoops": [{"iterator": "i", "range": [1, 0], "components": [
                {"id": "n_${i}", "type": "nosuch"}
            ]}]
        }}}"#;
        assert!(check(json).is_ok());
    }

    #[test]
    fn test_non_module_entry_skipped() {
        let doc = CircuitDocument::from_json(r#"{"entry": "top", "modules": {"top": {}}}"#).unwrap();
        let registry = doc.registry().unwrap();
        assert!(validate_definitions(&doc, &registry, "reg").is_ok());
    }
}
