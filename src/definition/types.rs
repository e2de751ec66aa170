//! Serde data model for component templates

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::{Params, Value};

/// A declared port; `size` may be a literal or a `${...}` expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl PortDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            group: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<Value>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Raw input wiring: one reference string, or a bundle that concatenates
/// several references into a vector input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBinding {
    Single(String),
    Bundle(Vec<String>),
}

impl RawBinding {
    /// The raw reference strings, in order
    pub fn parts(&self) -> Vec<&str> {
        match self {
            RawBinding::Single(s) => vec![s.as_str()],
            RawBinding::Bundle(parts) => parts.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for RawBinding {
    fn from(s: &str) -> Self {
        RawBinding::Single(s.to_string())
    }
}

/// A child component declared inside a module body or loop body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub parameters: Params,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, RawBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
}

impl ComponentRef {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            parameters: Params::new(),
            inputs: BTreeMap::new(),
            display: None,
        }
    }

    pub fn with_input(mut self, port: impl Into<String>, binding: impl Into<RawBinding>) -> Self {
        self.inputs.insert(port.into(), binding.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Loop-generated repetition of a component body over an inclusive range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDef {
    pub iterator: String,
    /// `[start, end]`, inclusive; either bound may be an expression
    pub range: [Value; 2],
    #[serde(default)]
    pub components: Vec<ComponentRef>,
}

/// Arrangement style for a port group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStyle {
    #[default]
    Sequential,
    Interleaved,
    Alternating,
}

/// Which side of the component a port group lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortGroupDef {
    #[serde(default)]
    pub style: GroupStyle,
    /// Explicit members; ports may also join via their own `group` field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<PortDirection>,
}

/// A component template: either a primitive or a module
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    #[serde(default)]
    pub is_primitive: bool,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub parameters: Params,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_loops: Vec<LoopDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_mappings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_groups: BTreeMap<String, PortGroupDef>,
    /// Presentation metadata passed through to the renderer untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
}

impl ComponentDefinition {
    /// Create a primitive with the given ports and declared latency
    pub fn primitive(inputs: Vec<PortDef>, outputs: Vec<PortDef>, latency: Option<i64>) -> Self {
        Self {
            is_primitive: true,
            inputs,
            outputs,
            latency: latency.map(Value::Int),
            ..Self::default()
        }
    }

    /// Create an empty module with the given ports
    pub fn module(inputs: Vec<PortDef>, outputs: Vec<PortDef>) -> Self {
        Self {
            inputs,
            outputs,
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_component(mut self, component: ComponentRef) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_loop(mut self, def: LoopDef) -> Self {
        self.component_loops.push(def);
        self
    }

    pub fn with_output_mapping(mut self, port: impl Into<String>, source: impl Into<String>) -> Self {
        self.output_mappings.insert(port.into(), source.into());
        self
    }

    /// A primitive never carries internal structure
    pub fn is_well_formed(&self) -> bool {
        !self.is_primitive
            || (self.components.is_empty()
                && self.component_loops.is_empty()
                && self.output_mappings.is_empty())
    }

    pub fn input(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_module_definition() {
        let json = r#"{
            "parameters": {"DELAY": 3},
            "inputs": [{"name": "in", "size": "${WIDTH}"}],
            "outputs": [{"name": "out"}],
            "componentLoops": [{
                "iterator": "i",
                "range": [0, "${DELAY-1}"],
                "components": [{"id": "reg_${i}", "type": "reg", "inputs": {"in": "$.in"}}]
            }],
            "outputMappings": {"out": "reg_2.out"}
        }"#;
        let def: ComponentDefinition = serde_json::from_str(json).unwrap();
        assert!(!def.is_primitive);
        assert_eq!(def.parameters["DELAY"], Value::Int(3));
        assert_eq!(def.inputs[0].size, Some(Value::from("${WIDTH}")));
        assert_eq!(def.component_loops[0].range[1], Value::from("${DELAY-1}"));
        assert_eq!(def.output_mappings["out"], "reg_2.out");
        assert!(def.is_well_formed());
    }

    #[test]
    fn test_bundle_binding() {
        let json = r#"{"id": "cat", "type": "reg", "inputs": {"in": ["a.out", "b.out[1]"]}}"#;
        let c: ComponentRef = serde_json::from_str(json).unwrap();
        assert_eq!(c.inputs["in"].parts(), vec!["a.out", "b.out[1]"]);
    }

    #[test]
    fn test_primitive_with_components_is_malformed() {
        let def = ComponentDefinition::primitive(vec![], vec![PortDef::new("out")], Some(1))
            .with_component(ComponentRef::new("x", "reg"));
        assert!(!def.is_well_formed());
    }

    #[test]
    fn test_group_style_default_sequential() {
        let g: PortGroupDef = serde_json::from_str(r#"{"ports": ["a", "b"]}"#).unwrap();
        assert_eq!(g.style, GroupStyle::Sequential);
    }
}
