//! Renderer-facing view of an elaborated, placed module

use serde::Serialize;

use crate::elaborate::{InputConnection, InstanceGraph, InstanceId, OutputMapping, Port, Position};
use crate::error::ElabError;
use crate::expr::Params;
use crate::layout::{latency, place_module, ArrangedGroup, CanvasPoint, LayoutConfig, ModuleSize};

/// One module with its direct children flattened for drawing
///
/// Nested modules appear as single components; drilling into one means
/// running the pipeline again with that module as the entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElaboratedGraph {
    pub module: ModuleSummary,
    pub components: Vec<RenderedComponent>,
}

impl ElaboratedGraph {
    pub fn component(&self, id: &str) -> Option<&RenderedComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub id: String,
    pub type_name: String,
    pub parameters: Params,
    pub latency: i64,
    pub width: f64,
    pub height: f64,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub output_mappings: Vec<OutputMapping>,
    pub port_groups: Vec<ArrangedGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
}

/// A child component record as the renderer consumes it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedComponent {
    pub id: String,
    pub type_name: String,
    pub is_primitive: bool,
    pub parameters: Params,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub connections: Vec<InputConnection>,
    pub cycle: i64,
    pub latency: i64,
    pub position: Position,
    /// `position` scaled by the configured column and row spacing
    pub canvas: CanvasPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
}

/// Lay out `module` and flatten it into an [`ElaboratedGraph`]
pub fn render_graph(
    graph: &mut InstanceGraph,
    module: InstanceId,
    config: &LayoutConfig,
) -> Result<ElaboratedGraph, ElabError> {
    let layout = place_module(graph, module, config)?;
    let module_latency = latency::module_latency(graph, module)?;

    let mut components = Vec::with_capacity(layout.placements.len());
    for &(child, position) in &layout.placements {
        let cycle = latency::cycle(graph, child)?;
        let child_latency = latency::module_latency(graph, child)?;
        let instance = graph.get(child);
        components.push(RenderedComponent {
            id: instance.id.clone(),
            type_name: instance.type_name.clone(),
            is_primitive: instance.is_primitive,
            parameters: instance.parameters.clone(),
            inputs: instance.inputs.clone(),
            outputs: instance.outputs.clone(),
            connections: instance.connections.clone(),
            cycle,
            latency: child_latency,
            position,
            canvas: config.canvas_point(position),
            display: instance.display.clone(),
        });
    }

    let instance = graph.get(module);
    let ModuleSize { width, height } = layout.size;
    let output_mappings = graph
        .body(module)
        .map(|b| b.output_mappings.clone())
        .unwrap_or_default();

    Ok(ElaboratedGraph {
        module: ModuleSummary {
            id: instance.id.clone(),
            type_name: instance.type_name.clone(),
            parameters: instance.parameters.clone(),
            latency: module_latency,
            width,
            height,
            inputs: instance.inputs.clone(),
            outputs: instance.outputs.clone(),
            output_mappings,
            port_groups: layout.port_groups,
            display: instance.display.clone(),
        },
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ComponentDefinition, ComponentRef, DefinitionRegistry, PortDef};
    use crate::elaborate::Elaborator;

    fn rendered_mac() -> ElaboratedGraph {
        let mut registry = DefinitionRegistry::new();
        registry.register(
            "mac",
            ComponentDefinition::module(
                vec![PortDef::new("x"), PortDef::new("w")],
                vec![PortDef::new("y")],
            )
            .with_component(
                ComponentRef::new("m", "mul")
                    .with_input("a", "$.x")
                    .with_input("b", "$.w"),
            )
            .with_output_mapping("y", "m.out"),
        );
        let mut graph = Elaborator::new(&registry)
            .elaborate("mac", &Params::new())
            .unwrap();
        let root = graph.root();
        render_graph(&mut graph, root, &LayoutConfig::default()).unwrap()
    }

    #[test]
    fn test_render_records() {
        let rendered = rendered_mac();
        assert_eq!(rendered.module.latency, 1);
        let m = rendered.component("m").unwrap();
        assert_eq!(m.cycle, 1);
        assert_eq!(m.position, Position::new(1, 2));
        assert_eq!(m.canvas, CanvasPoint { x: 120.0, y: 120.0 });
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(rendered_mac()).unwrap();
        assert_eq!(json["module"]["typeName"], "mac");
        assert_eq!(json["components"][0]["isPrimitive"], true);
        assert_eq!(
            json["components"][0]["connections"][0]["sources"][0],
            serde_json::json!({"kind": "moduleInput", "name": "x"})
        );
        assert!(json["components"][0].get("display").is_none());
        assert_eq!(
            json["components"][0]["canvas"],
            serde_json::json!({"x": 120.0, "y": 120.0})
        );
    }
}
