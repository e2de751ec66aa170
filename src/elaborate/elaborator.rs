//! Template elaboration - expands module definitions into an instance graph

use std::collections::{BTreeMap, BTreeSet};

use super::instance::{
    ComponentInstance, InputConnection, InstanceGraph, InstanceId, ModuleBody, OutputMapping,
    Port, PortGroup,
};
use super::reference::ConnectionReference;
use crate::definition::{
    ComponentDefinition, ComponentRef, DefinitionRegistry, LoopDef, PortDef, PortDirection,
    INPUT, OUTPUT, REGISTER,
};
use crate::error::{find_similar, ElabError, ExpressionError};
use crate::expr::{Evaluator, Params, Scope, Value};

/// Evaluated-but-unresolved wiring of one child: `(input port, raw references)`
type PendingWiring = Vec<(String, Vec<String>)>;

/// Elaborates definitions from one registry into instance graphs
///
/// The evaluator cache lives as long as the elaborator; create a fresh
/// elaborator for each independent run.
#[derive(Debug)]
pub struct Elaborator<'r> {
    registry: &'r DefinitionRegistry,
    evaluator: Evaluator,
    /// Module types currently being expanded, outermost first
    resolving: Vec<String>,
}

impl<'r> Elaborator<'r> {
    pub fn new(registry: &'r DefinitionRegistry) -> Self {
        Self {
            registry,
            evaluator: Evaluator::new(),
            resolving: Vec::new(),
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Elaborate a registered type as a top-level entry point
    ///
    /// The root instance takes the type name as its id.
    pub fn elaborate(&mut self, type_name: &str, overrides: &Params) -> Result<InstanceGraph, ElabError> {
        let registry = self.registry;
        let definition = registry.lookup(type_name)?;
        self.instantiate(type_name, type_name, definition, overrides)
    }

    /// Instantiate `definition` under `id` with `overrides` winning over its
    /// default parameters
    pub fn instantiate(
        &mut self,
        id: &str,
        type_name: &str,
        definition: &ComponentDefinition,
        overrides: &Params,
    ) -> Result<InstanceGraph, ElabError> {
        let empty = Params::new();
        let ancestors = Scope::new(&empty);

        let instance = self.prepare(
            id,
            type_name,
            definition,
            overrides,
            &ancestors,
            definition.display.clone(),
        )?;
        let params = instance.parameters.clone();
        let mut graph = InstanceGraph::with_root(
            instance,
            (!definition.is_primitive).then(ModuleBody::default),
        );

        if !definition.is_primitive {
            let root = graph.root();
            let scope = ancestors.child(&params);
            self.resolving.push(type_name.to_string());
            let result = self.elaborate_body(&mut graph, root, definition, &scope);
            self.resolving.pop();
            result?;
        }

        tracing::debug!(
            entry = type_name,
            instances = graph.instance_count(),
            "elaboration finished"
        );
        Ok(graph)
    }

    /// Steps 1-2 and primitive latency: merged parameters, sized ports
    fn prepare(
        &mut self,
        id: &str,
        type_name: &str,
        definition: &ComponentDefinition,
        overrides: &Params,
        ancestors: &Scope<'_>,
        display: Option<serde_json::Value>,
    ) -> Result<ComponentInstance, ElabError> {
        let parameters = self.resolve_parameters(definition, overrides, ancestors)?;

        let scope = ancestors.child(&parameters);
        let inputs = self.resolve_ports(id, &definition.inputs, &scope)?;
        let outputs = self.resolve_ports(id, &definition.outputs, &scope)?;
        let latency = if definition.is_primitive {
            Some(self.primitive_latency(type_name, definition, &scope)?)
        } else {
            None
        };

        let mut instance = ComponentInstance::new(id, type_name, definition.is_primitive);
        instance.inputs = inputs;
        instance.outputs = outputs;
        instance.display = display;
        if let Some(latency) = latency {
            instance.set_primitive_latency(latency);
        }
        instance.parameters = parameters;
        Ok(instance)
    }

    fn resolve_parameters(
        &mut self,
        definition: &ComponentDefinition,
        overrides: &Params,
        ancestors: &Scope<'_>,
    ) -> Result<Params, ElabError> {
        let mut merged = definition.parameters.clone();
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }

        // Templated values resolve once every parameter they read has; each
        // round sees the merged parameters resolved so far and every ancestor
        let mut pending: Vec<String> = merged
            .iter()
            .filter(|(_, v)| v.is_templated())
            .map(|(k, _)| k.clone())
            .collect();
        while !pending.is_empty() {
            let mut blocked: BTreeMap<String, String> = BTreeMap::new();
            for name in &pending {
                let Some(Value::Str(text)) = merged.get(name) else {
                    continue;
                };
                let waits_on = self
                    .evaluator
                    .variables(text)?
                    .iter()
                    .find(|v| pending.contains(v))
                    .cloned();
                if let Some(dependency) = waits_on {
                    blocked.insert(name.clone(), dependency);
                }
            }
            if blocked.len() == pending.len() {
                return Err(ElabError::cycle(parameter_cycle(&blocked)));
            }

            let snapshot = merged.clone();
            let scope = ancestors.child(&snapshot);
            for name in pending.iter().filter(|n| !blocked.contains_key(*n)) {
                if let Some(value) = merged.get_mut(name) {
                    *value = self.evaluator.evaluate_value(value, &scope)?;
                }
            }
            pending.retain(|n| blocked.contains_key(n));
        }
        Ok(merged)
    }

    fn resolve_ports(
        &mut self,
        component: &str,
        ports: &[PortDef],
        scope: &Scope<'_>,
    ) -> Result<Vec<Port>, ElabError> {
        let mut resolved = Vec::with_capacity(ports.len());
        for def in ports {
            let size = match &def.size {
                None => 1,
                Some(raw) => {
                    let value = self.evaluator.evaluate_value(raw, scope)?;
                    let size = match &value {
                        Value::Str(s) => s.trim().parse::<i64>().ok(),
                        other => other.as_i64(),
                    };
                    match size {
                        Some(n) if n > 0 => n as usize,
                        _ => return Err(ElabError::invalid_port_size(component, &def.name, value)),
                    }
                }
            };
            resolved.push(Port {
                name: def.name.clone(),
                size,
                group: def.group.clone(),
            });
        }
        Ok(resolved)
    }

    /// `input`/`output` are fixed at 0 and `reg` at 1; others use the
    /// declared latency, defaulting to 1
    fn primitive_latency(
        &mut self,
        type_name: &str,
        definition: &ComponentDefinition,
        scope: &Scope<'_>,
    ) -> Result<i64, ElabError> {
        match type_name {
            INPUT | OUTPUT => return Ok(0),
            REGISTER => return Ok(1),
            _ => {}
        }
        let Some(raw) = &definition.latency else {
            return Ok(1);
        };
        let value = self.evaluator.evaluate_value(raw, scope)?;
        match value.as_i64() {
            Some(n) if n >= 0 => Ok(n),
            _ => Err(ExpressionError::new(
                raw.to_string(),
                format!("latency must be a non-negative integer, got {}", value),
            )
            .into()),
        }
    }

    /// Steps 4-7 for one module instance
    fn elaborate_body(
        &mut self,
        graph: &mut InstanceGraph,
        module: InstanceId,
        definition: &ComponentDefinition,
        scope: &Scope<'_>,
    ) -> Result<(), ElabError> {
        let mut pending: Vec<(InstanceId, PendingWiring)> = Vec::new();

        let no_context = Params::new();
        let local = scope.child(&no_context);
        for component in &definition.components {
            pending.push(self.instantiate_child(graph, module, component, scope, &local)?);
        }

        for def in &definition.component_loops {
            self.expand_loop(graph, module, def, scope, &mut pending)?;
        }

        // Resolved only once every explicit and loop-generated sibling exists.
        // A reference to any later-declared sibling is therefore accepted,
        // whether or not its id is templated.
        for (child, wiring) in pending {
            let connections = self.resolve_connections(graph, module, child, wiring)?;
            graph.get_mut(child).connections = connections;
        }

        let mappings = self.resolve_output_mappings(graph, module, definition, scope)?;
        let groups = resolve_port_groups(graph, module, definition)?;
        if let Some(body) = graph.body_mut(module) {
            body.output_mappings = mappings;
            body.port_groups = groups;
        }

        tracing::debug!(
            module = %graph.path(module),
            children = graph.children(module).len(),
            "module elaborated"
        );
        Ok(())
    }

    fn expand_loop(
        &mut self,
        graph: &mut InstanceGraph,
        module: InstanceId,
        def: &LoopDef,
        scope: &Scope<'_>,
        pending: &mut Vec<(InstanceId, PendingWiring)>,
    ) -> Result<(), ElabError> {
        let start = self.loop_bound(&def.range[0], scope)?;
        let end = self.loop_bound(&def.range[1], scope)?;

        tracing::debug!(
            module = %graph.path(module),
            iterator = %def.iterator,
            start,
            end,
            "expanding component loop"
        );

        // Inclusive; an inverted range simply yields nothing
        for i in start..=end {
            let mut context = Params::new();
            context.insert(def.iterator.clone(), Value::Int(i));
            let local = scope.child(&context);
            for component in &def.components {
                pending.push(self.instantiate_child(graph, module, component, scope, &local)?);
            }
        }
        Ok(())
    }

    fn loop_bound(&mut self, raw: &Value, scope: &Scope<'_>) -> Result<i64, ElabError> {
        let value = self.evaluator.evaluate_value(raw, scope)?;
        value.as_i64().ok_or_else(|| {
            ExpressionError::new(
                raw.to_string(),
                format!("loop bound must be an integer, got {}", value),
            )
            .into()
        })
    }

    /// Instantiate one child of `module`
    ///
    /// String fields are evaluated in `local` (module scope plus any loop
    /// context); the child itself inherits only `ancestors`.
    fn instantiate_child(
        &mut self,
        graph: &mut InstanceGraph,
        module: InstanceId,
        component: &ComponentRef,
        ancestors: &Scope<'_>,
        local: &Scope<'_>,
    ) -> Result<(InstanceId, PendingWiring), ElabError> {
        let id = self.evaluate_text(&component.id, local)?;
        let type_name = self.evaluate_text(&component.type_name, local)?;

        let mut overrides = Params::new();
        for (name, value) in &component.parameters {
            overrides.insert(name.clone(), self.evaluator.evaluate_value(value, local)?);
        }

        let mut wiring = Vec::with_capacity(component.inputs.len());
        for (port, binding) in &component.inputs {
            let mut parts = Vec::new();
            for raw in binding.parts() {
                parts.push(self.evaluate_text(raw, local)?);
            }
            wiring.push((port.clone(), parts));
        }

        let registry = self.registry;
        let definition = registry.lookup(&type_name)?;
        if self.resolving.contains(&type_name) {
            let mut path = self.resolving.clone();
            path.push(type_name);
            return Err(ElabError::cycle(path));
        }

        let display = component
            .display
            .clone()
            .or_else(|| definition.display.clone());
        let instance = self.prepare(&id, &type_name, definition, &overrides, ancestors, display)?;
        let params = instance.parameters.clone();
        let is_module = !definition.is_primitive;
        let child = graph.attach(module, instance, is_module.then(ModuleBody::default))?;

        tracing::trace!(id = %id, type_name = %type_name, "component instantiated");

        if is_module {
            let scope = ancestors.child(&params);
            self.resolving.push(type_name);
            let result = self.elaborate_body(graph, child, definition, &scope);
            self.resolving.pop();
            result?;
        }

        Ok((child, wiring))
    }

    fn evaluate_text(&mut self, raw: &str, scope: &Scope<'_>) -> Result<String, ElabError> {
        Ok(self.evaluator.evaluate_str(raw, scope)?.to_string())
    }

    /// Step 7: parse, bounds-check and size-check every input of a child
    fn resolve_connections(
        &self,
        graph: &InstanceGraph,
        module: InstanceId,
        child: InstanceId,
        wiring: PendingWiring,
    ) -> Result<Vec<InputConnection>, ElabError> {
        let scope = graph.path(module);
        let instance = graph.get(child);
        let mut connections = Vec::with_capacity(wiring.len());

        for (port_name, parts) in wiring {
            let port = instance.input(&port_name).ok_or_else(|| {
                ElabError::invalid_reference(
                    &scope,
                    format!("{}.{}", instance.id, port_name),
                    format!("'{}' has no input port '{}'", instance.type_name, port_name),
                )
            })?;

            let mut sources = Vec::with_capacity(parts.len());
            let mut elements = 0;
            for raw in parts {
                let reference = ConnectionReference::parse(&raw)
                    .map_err(|reason| ElabError::invalid_reference(&scope, &raw, reason))?;
                elements += element_count(graph, module, &reference, &raw)?;
                sources.push(reference);
            }

            if elements != port.size {
                return Err(ElabError::size_mismatch(
                    &instance.id,
                    &port_name,
                    port.size,
                    elements,
                ));
            }
            connections.push(InputConnection {
                port: port_name,
                sources,
            });
        }

        connections.sort_by_key(|c| instance.inputs.iter().position(|p| p.name == c.port));
        Ok(connections)
    }

    /// Step 6: evaluate and check each output mapping, in output port order
    fn resolve_output_mappings(
        &mut self,
        graph: &InstanceGraph,
        module: InstanceId,
        definition: &ComponentDefinition,
        scope: &Scope<'_>,
    ) -> Result<Vec<OutputMapping>, ElabError> {
        let scope_name = graph.path(module);
        let instance = graph.get(module);

        if let Some(port) = definition
            .output_mappings
            .keys()
            .find(|name| instance.output(name).is_none())
        {
            return Err(ElabError::invalid_reference(
                scope_name,
                port.as_str(),
                "output mapping names no output port of the module",
            ));
        }

        let mut mappings = Vec::new();
        for port in &instance.outputs {
            let Some(raw) = definition.output_mappings.get(&port.name) else {
                continue;
            };
            let text = self.evaluate_text(raw, scope)?;
            let source = ConnectionReference::parse(&text)
                .map_err(|reason| ElabError::invalid_reference(&scope_name, &text, reason))?;
            let elements = element_count(graph, module, &source, &text)?;
            if elements != port.size {
                return Err(ElabError::size_mismatch(
                    &instance.id,
                    &port.name,
                    port.size,
                    elements,
                ));
            }
            mappings.push(OutputMapping {
                port: port.name.clone(),
                source,
            });
        }
        Ok(mappings)
    }
}

/// Follow parameter dependencies until one repeats
///
/// Every key of `blocked` waits on another key, so the walk always closes.
fn parameter_cycle(blocked: &BTreeMap<String, String>) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    let mut current = blocked.keys().next().cloned().unwrap_or_default();
    while !path.contains(&current) {
        path.push(current.clone());
        match blocked.get(&current) {
            Some(next) => current = next.clone(),
            None => break,
        }
    }
    let start = path.iter().position(|p| *p == current).unwrap_or(0);
    let mut cycle = path.split_off(start);
    cycle.push(current);
    cycle
}

/// Number of signal elements a reference carries within `module`
///
/// Unindexed references carry the whole port; indexed ones a single element
/// and must be in bounds.
fn element_count(
    graph: &InstanceGraph,
    module: InstanceId,
    reference: &ConnectionReference,
    raw: &str,
) -> Result<usize, ElabError> {
    let scope = graph.path(module);
    let port = match reference {
        ConnectionReference::ModuleInput { name, .. } => {
            graph.get(module).input(name).ok_or_else(|| {
                ElabError::invalid_reference(
                    &scope,
                    raw,
                    format!("enclosing module has no input port '{}'", name),
                )
            })?
        }
        ConnectionReference::ComponentOutput {
            component_id,
            port_name,
            ..
        } => {
            let sibling = graph.child(module, component_id).ok_or_else(|| {
                let known = graph
                    .body(module)
                    .map(|b| find_similar(b.child_ids(), component_id, 2))
                    .unwrap_or_default();
                let hint = if known.is_empty() {
                    String::new()
                } else {
                    format!(" (did you mean {}?)", known.join(", "))
                };
                ElabError::invalid_reference(
                    &scope,
                    raw,
                    format!("no component '{}' in this module{}", component_id, hint),
                )
            })?;
            let sibling = graph.get(sibling);
            sibling.output(port_name).ok_or_else(|| {
                ElabError::invalid_reference(
                    &scope,
                    raw,
                    format!(
                        "'{}' ({}) has no output port '{}'",
                        sibling.id, sibling.type_name, port_name
                    ),
                )
            })?
        }
    };

    match reference.index() {
        None => Ok(port.size),
        Some(i) if i < port.size => Ok(1),
        Some(i) => Err(ElabError::invalid_reference(
            scope,
            raw,
            format!(
                "index {} out of bounds for port '{}' of size {}",
                i, port.name, port.size
            ),
        )),
    }
}

/// Collect each port group's members: explicit list first, then ports that
/// name the group themselves, in declaration order
fn resolve_port_groups(
    graph: &InstanceGraph,
    module: InstanceId,
    definition: &ComponentDefinition,
) -> Result<Vec<PortGroup>, ElabError> {
    let instance = graph.get(module);
    let all_ports: Vec<&Port> = instance.inputs.iter().chain(&instance.outputs).collect();

    let mut group_ids: BTreeSet<&str> = definition.port_groups.keys().map(String::as_str).collect();
    group_ids.extend(all_ports.iter().filter_map(|p| p.group.as_deref()));

    let mut groups = Vec::with_capacity(group_ids.len());
    for gid in group_ids {
        let def = definition.port_groups.get(gid).cloned().unwrap_or_default();
        let mut ports = def.ports.clone();
        for port in &all_ports {
            if port.group.as_deref() == Some(gid) && !ports.contains(&port.name) {
                ports.push(port.name.clone());
            }
        }

        if let Some(unknown) = ports.iter().find(|name| all_ports.iter().all(|p| &p.name != *name)) {
            return Err(ElabError::invalid_reference(
                graph.path(module),
                unknown.as_str(),
                format!("port group '{}' names an unknown port", gid),
            ));
        }

        let direction = def.direction.or_else(|| {
            if ports.iter().all(|n| instance.input(n).is_some()) {
                Some(PortDirection::Input)
            } else if ports.iter().all(|n| instance.output(n).is_some()) {
                Some(PortDirection::Output)
            } else {
                None
            }
        });

        groups.push(PortGroup {
            id: gid.to_string(),
            style: def.style,
            direction,
            ports,
        });
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ComponentRef, LoopDef, RawBinding};

    fn delay_chain() -> ComponentDefinition {
        ComponentDefinition::module(vec![PortDef::new("in")], vec![PortDef::new("out")])
            .with_parameter("DELAY", 3i64)
            .with_loop(LoopDef {
                iterator: "i".into(),
                range: [Value::Int(0), Value::from("${DELAY-1}")],
                components: vec![ComponentRef::new("reg_${i}", "reg")
                    .with_input("in", "${i == 0 ? '$.in' : 'reg_' + (i-1) + '.out'}")],
            })
            .with_output_mapping("out", "reg_${DELAY-1}.out")
    }

    fn registry_with(name: &str, def: ComponentDefinition) -> DefinitionRegistry {
        let mut registry = DefinitionRegistry::new();
        registry.register(name, def);
        registry
    }

    #[test]
    fn test_loop_generates_inclusive_range() {
        let registry = registry_with("delay_chain", delay_chain());
        let graph = Elaborator::new(&registry)
            .elaborate("delay_chain", &Params::new())
            .unwrap();
        let root = graph.root();
        let ids: Vec<&str> = graph
            .children(root)
            .iter()
            .map(|c| graph.get(*c).id.as_str())
            .collect();
        assert_eq!(ids, vec!["reg_0", "reg_1", "reg_2"]);

        let reg1 = graph.get(graph.child(root, "reg_1").unwrap());
        assert_eq!(
            reg1.connection("in").unwrap().sources,
            vec![ConnectionReference::parse("reg_0.out").unwrap()]
        );
        let mappings = &graph.body(root).unwrap().output_mappings;
        assert_eq!(mappings[0].source.to_string(), "reg_2.out");
    }

    #[test]
    fn test_override_beats_default() {
        let registry = registry_with("delay_chain", delay_chain());
        let mut overrides = Params::new();
        overrides.insert("DELAY".into(), Value::Int(5));
        let graph = Elaborator::new(&registry)
            .elaborate("delay_chain", &overrides)
            .unwrap();
        assert_eq!(graph.children(graph.root()).len(), 5);
        assert_eq!(graph.get(graph.root()).parameters["DELAY"], Value::Int(5));
    }

    #[test]
    fn test_inverted_range_yields_nothing() {
        let def = delay_chain().with_output_mapping("out", "$.in");
        let registry = registry_with("delay_chain", def);
        let mut overrides = Params::new();
        overrides.insert("DELAY".into(), Value::Int(0));
        let graph = Elaborator::new(&registry)
            .elaborate("delay_chain", &overrides)
            .unwrap();
        assert!(graph.children(graph.root()).is_empty());
    }

    #[test]
    fn test_port_size_from_parameter() {
        let def = ComponentDefinition::module(
            vec![PortDef::new("bus").with_size("${N*2}")],
            vec![],
        )
        .with_parameter("N", 2i64);
        let registry = registry_with("wide", def);
        let graph = Elaborator::new(&registry)
            .elaborate("wide", &Params::new())
            .unwrap();
        assert_eq!(graph.get(graph.root()).inputs[0].size, 4);
    }

    #[test]
    fn test_zero_port_size_rejected() {
        let def = ComponentDefinition::module(vec![PortDef::new("bus").with_size("${N}")], vec![])
            .with_parameter("N", 0i64);
        let registry = registry_with("wide", def);
        let err = Elaborator::new(&registry)
            .elaborate("wide", &Params::new())
            .unwrap_err();
        assert!(matches!(err, ElabError::InvalidPortSize { ref port, .. } if port == "bus"));
    }

    #[test]
    fn test_unknown_type_is_definition_not_found() {
        let def = ComponentDefinition::module(vec![], vec![])
            .with_component(ComponentRef::new("x", "regg"));
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        assert!(matches!(err, ElabError::DefinitionNotFound { ref type_name, .. } if type_name == "regg"));
    }

    #[test]
    fn test_loop_id_collision_is_duplicate() {
        let def = ComponentDefinition::module(vec![PortDef::new("in")], vec![])
            .with_component(ComponentRef::new("r_1", "reg").with_input("in", "$.in"))
            .with_loop(LoopDef {
                iterator: "k".into(),
                range: [Value::Int(0), Value::Int(2)],
                components: vec![ComponentRef::new("r_${k}", "reg").with_input("in", "$.in")],
            });
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        assert_eq!(err, ElabError::duplicate("top", "r_1"));
    }

    #[test]
    fn test_forward_reference_resolves() {
        let def = ComponentDefinition::module(vec![PortDef::new("in")], vec![PortDef::new("out")])
            .with_component(ComponentRef::new("second", "reg").with_input("in", "first.out"))
            .with_component(ComponentRef::new("first", "reg").with_input("in", "$.in"))
            .with_output_mapping("out", "second.out");
        let registry = registry_with("top", def);
        assert!(Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .is_ok());
    }

    #[test]
    fn test_unknown_sibling_suggests() {
        let def = ComponentDefinition::module(vec![PortDef::new("in")], vec![])
            .with_component(ComponentRef::new("first", "reg").with_input("in", "$.in"))
            .with_component(ComponentRef::new("second", "reg").with_input("in", "frist.out"));
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        match err {
            ElabError::InvalidReference { reason, .. } => assert!(reason.contains("did you mean first")),
            other => panic!("expected InvalidReference, got {:?}", other),
        }
    }

    #[test]
    fn test_vector_bundle_size_checked() {
        let def = ComponentDefinition::module(vec![PortDef::new("a"), PortDef::new("b")], vec![])
            .with_component(
                ComponentRef::new("pair", "reg")
                    .with_parameter("WIDTH", 2i64)
                    .with_input("in", RawBinding::Bundle(vec!["$.a".into(), "$.b".into()])),
            )
            .with_component(
                ComponentRef::new("short", "reg")
                    .with_parameter("WIDTH", 3i64)
                    .with_input("in", RawBinding::Bundle(vec!["$.a".into(), "$.b".into()])),
            );
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        assert_eq!(err, ElabError::size_mismatch("short", "in", 3, 2));
    }

    #[test]
    fn test_unknown_input_port_rejected() {
        let def = ComponentDefinition::module(vec![PortDef::new("x")], vec![])
            .with_component(ComponentRef::new("m", "mul").with_input("c", "$.x"));
        let registry = registry_with("top", def);
        assert!(matches!(
            Elaborator::new(&registry).elaborate("top", &Params::new()),
            Err(ElabError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_self_instantiating_module_is_cycle() {
        let def = ComponentDefinition::module(vec![], vec![])
            .with_component(ComponentRef::new("again", "loopy"));
        let registry = registry_with("loopy", def);
        let err = Elaborator::new(&registry)
            .elaborate("loopy", &Params::new())
            .unwrap_err();
        assert_eq!(err, ElabError::cycle(vec!["loopy".into(), "loopy".into()]));
    }

    #[test]
    fn test_child_reads_ancestor_parameter() {
        let inner = ComponentDefinition::module(
            vec![PortDef::new("in").with_size("${BUS}")],
            vec![],
        );
        let outer = ComponentDefinition::module(vec![], vec![])
            .with_parameter("BUS", 4i64)
            .with_component(ComponentRef::new("child", "inner"));
        let mut registry = registry_with("inner", inner);
        registry.register("outer", outer);
        let graph = Elaborator::new(&registry)
            .elaborate("outer", &Params::new())
            .unwrap();
        let child = graph.find("child").unwrap();
        assert_eq!(graph.get(child).inputs[0].size, 4);
    }

    #[test]
    fn test_port_groups_collected() {
        let mut def = ComponentDefinition::module(
            vec![
                PortDef::new("x0").in_group("data"),
                PortDef::new("w0").in_group("data"),
            ],
            vec![PortDef::new("y")],
        );
        def.port_groups.insert(
            "data".into(),
            crate::definition::PortGroupDef {
                style: crate::definition::GroupStyle::Interleaved,
                ports: vec![],
                direction: None,
            },
        );
        let registry = registry_with("top", def);
        let graph = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap();
        let groups = &graph.body(graph.root()).unwrap().port_groups;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].ports, vec!["x0", "w0"]);
        assert_eq!(groups[0].direction, Some(PortDirection::Input));
    }

    #[test]
    fn test_chained_defaults_resolve_in_dependency_order() {
        let def = ComponentDefinition::module(vec![PortDef::new("bus").with_size("${C}")], vec![])
            .with_parameter("A", 2i64)
            .with_parameter("B", "${A*2}")
            .with_parameter("C", "${B+1}");
        let registry = registry_with("wide", def);
        let graph = Elaborator::new(&registry)
            .elaborate("wide", &Params::new())
            .unwrap();
        let root = graph.get(graph.root());
        assert_eq!(root.parameters["B"], Value::Int(4));
        assert_eq!(root.parameters["C"], Value::Int(5));
        assert_eq!(root.inputs[0].size, 5);
    }

    #[test]
    fn test_override_feeds_templated_default() {
        let def = ComponentDefinition::module(vec![PortDef::new("bus").with_size("${B}")], vec![])
            .with_parameter("A", 2i64)
            .with_parameter("B", "${A*2}");
        let registry = registry_with("wide", def);
        let mut overrides = Params::new();
        overrides.insert("A".into(), Value::from("${3}"));
        let graph = Elaborator::new(&registry)
            .elaborate("wide", &overrides)
            .unwrap();
        assert_eq!(graph.get(graph.root()).inputs[0].size, 6);
    }

    #[test]
    fn test_self_referential_default_is_cycle() {
        let def = ComponentDefinition::module(vec![], vec![]).with_parameter("N", "${N+1}");
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        assert_eq!(err, ElabError::cycle(vec!["N".into(), "N".into()]));
    }

    #[test]
    fn test_mutually_dependent_defaults_are_cycle() {
        let def = ComponentDefinition::module(vec![], vec![])
            .with_parameter("P", "${Q}")
            .with_parameter("Q", "${P}")
            .with_parameter("R", "${P+1}");
        let registry = registry_with("top", def);
        let err = Elaborator::new(&registry)
            .elaborate("top", &Params::new())
            .unwrap_err();
        assert_eq!(err, ElabError::cycle(vec!["P".into(), "Q".into(), "P".into()]));
    }
}
