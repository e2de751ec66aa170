//! Arena-backed instance graph produced by elaboration
//!
//! Every instance lives in one `Vec` and is addressed by [`InstanceId`].
//! Modules own their children by index, siblings refer to each other by
//! string id through the module's id table, and the parent index is kept only
//! so cache invalidation can walk upward. The structure is therefore acyclic
//! in ownership and trivially serializable.

use std::collections::HashMap;

use serde::Serialize;

use super::reference::ConnectionReference;
use crate::definition::{GroupStyle, PortDirection};
use crate::error::ElabError;
use crate::expr::Params;

/// Index of an instance in its [`InstanceGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(usize);

/// A port with its size resolved to a positive integer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub name: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Port {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            group: None,
        }
    }
}

/// The resolved sources wired into one input port
///
/// A single reference yields one entry; a bundle yields several whose
/// element counts add up to the port size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputConnection {
    pub port: String,
    pub sources: Vec<ConnectionReference>,
}

/// A module output port and the internal signal that drives it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputMapping {
    pub port: String,
    pub source: ConnectionReference,
}

/// A resolved port group: style plus ordered member ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortGroup {
    pub id: String,
    pub style: GroupStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<PortDirection>,
    pub ports: Vec<String>,
}

/// Grid position: `x` is the column (clock cycle), `y` the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// One elaborated component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInstance {
    /// Unique within the owning module
    pub id: String,
    pub type_name: String,
    pub is_primitive: bool,
    pub parameters: Params,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub connections: Vec<InputConnection>,
    /// Opaque presentation metadata
    pub display: Option<serde_json::Value>,
    latency: Option<i64>,
    cycle: Option<i64>,
    position: Option<Position>,
}

impl ComponentInstance {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>, is_primitive: bool) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            is_primitive,
            parameters: Params::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            connections: Vec::new(),
            display: None,
            latency: None,
            cycle: None,
            position: None,
        }
    }

    /// Primitive latency is fixed at elaboration; module latency once computed
    pub fn latency(&self) -> Option<i64> {
        self.latency
    }

    pub fn cycle(&self) -> Option<i64> {
        self.cycle
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn connection(&self, port: &str) -> Option<&InputConnection> {
        self.connections.iter().find(|c| c.port == port)
    }

    /// Every reference feeding this instance, in port order
    pub fn sources(&self) -> impl Iterator<Item = &ConnectionReference> {
        self.connections.iter().flat_map(|c| c.sources.iter())
    }

    pub(crate) fn set_primitive_latency(&mut self, latency: i64) {
        self.latency = Some(latency);
    }
}

/// The internal structure of a module instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleBody {
    /// Children in declaration order (explicit components, then loops)
    pub children: Vec<InstanceId>,
    pub output_mappings: Vec<OutputMapping>,
    pub port_groups: Vec<PortGroup>,
    ids: HashMap<String, InstanceId>,
}

impl ModuleBody {
    /// Look up a child by its string id
    pub fn child(&self, id: &str) -> Option<InstanceId> {
        self.ids.get(id).copied()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct InstanceNode {
    instance: ComponentInstance,
    parent: Option<InstanceId>,
    body: Option<ModuleBody>,
}

/// The elaborated instance tree of one top-level module
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceGraph {
    nodes: Vec<InstanceNode>,
    root: InstanceId,
    /// Set once any timing or position annotation has been cached
    annotated: bool,
}

impl InstanceGraph {
    /// Create a graph holding only its root instance
    pub fn with_root(instance: ComponentInstance, body: Option<ModuleBody>) -> Self {
        Self {
            nodes: vec![InstanceNode {
                instance,
                parent: None,
                body,
            }],
            root: InstanceId(0),
            annotated: false,
        }
    }

    pub fn root(&self) -> InstanceId {
        self.root
    }

    pub fn get(&self, id: InstanceId) -> &ComponentInstance {
        &self.nodes[id.0].instance
    }

    pub fn get_mut(&mut self, id: InstanceId) -> &mut ComponentInstance {
        &mut self.nodes[id.0].instance
    }

    pub fn body(&self, id: InstanceId) -> Option<&ModuleBody> {
        self.nodes[id.0].body.as_ref()
    }

    pub fn body_mut(&mut self, id: InstanceId) -> Option<&mut ModuleBody> {
        self.nodes[id.0].body.as_mut()
    }

    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.nodes[id.0].parent
    }

    /// Children of a module in declaration order; empty for primitives
    pub fn children(&self, id: InstanceId) -> &[InstanceId] {
        self.body(id).map(|b| b.children.as_slice()).unwrap_or(&[])
    }

    /// Resolve a sibling-scope id within `module`
    pub fn child(&self, module: InstanceId, id: &str) -> Option<InstanceId> {
        self.body(module).and_then(|b| b.child(id))
    }

    /// Find an instance by dotted path from the root, e.g. `"mac.mul0"`
    pub fn find(&self, path: &str) -> Option<InstanceId> {
        let mut current = self.root;
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Dotted path of an instance, starting at the root's id
    pub fn path(&self, id: InstanceId) -> String {
        let mut segments = vec![self.get(id).id.as_str()];
        let mut current = self.parent(id);
        while let Some(p) = current {
            segments.push(self.get(p).id.as_str());
            current = self.parent(p);
        }
        segments.reverse();
        segments.join(".")
    }

    /// Number of instances reachable from the root
    pub fn instance_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.children(id).iter().copied());
        }
        count
    }

    /// Add a child to a module instance
    ///
    /// Fails with `DuplicateId` when the module already has a child with the
    /// same id. Cached annotations of the module and its ancestors are cleared.
    pub fn attach(
        &mut self,
        module: InstanceId,
        instance: ComponentInstance,
        body: Option<ModuleBody>,
    ) -> Result<InstanceId, ElabError> {
        let new_id = InstanceId(self.nodes.len());
        let scope = self.path(module);
        let Some(parent_body) = self.nodes[module.0].body.as_mut() else {
            return Err(ElabError::invalid_reference(
                scope,
                instance.id,
                "cannot add a child to a primitive",
            ));
        };
        if parent_body.ids.contains_key(&instance.id) {
            return Err(ElabError::duplicate(scope, instance.id));
        }
        parent_body.ids.insert(instance.id.clone(), new_id);
        parent_body.children.push(new_id);
        self.nodes.push(InstanceNode {
            instance,
            parent: Some(module),
            body,
        });
        self.invalidate(module);
        Ok(new_id)
    }

    /// Remove a child from a module instance by its string id
    ///
    /// The detached subtree stays in the arena but is no longer reachable.
    pub fn detach(&mut self, module: InstanceId, id: &str) -> Option<InstanceId> {
        let body = self.nodes[module.0].body.as_mut()?;
        let removed = body.ids.remove(id)?;
        body.children.retain(|c| *c != removed);
        self.nodes[removed.0].parent = None;
        self.invalidate(module);
        Some(removed)
    }

    /// Clear cached cycles, module latencies and positions affected by a
    /// structural change to `module`
    ///
    /// Walks the parent chain to the root: a changed module latency shifts
    /// the cycle of every component downstream of it in each ancestor.
    pub fn invalidate(&mut self, module: InstanceId) {
        if !self.annotated {
            return;
        }
        let mut current = Some(module);
        while let Some(m) = current {
            tracing::trace!(module = %self.path(m), "invalidating cached annotations");
            self.clear_annotations(m);
            let children = self.children(m).to_vec();
            for child in children {
                let node = &mut self.nodes[child.0];
                node.instance.cycle = None;
                node.instance.position = None;
            }
            current = self.parent(m);
        }
    }

    fn clear_annotations(&mut self, id: InstanceId) {
        let node = &mut self.nodes[id.0];
        node.instance.cycle = None;
        node.instance.position = None;
        if node.body.is_some() {
            node.instance.latency = None;
        }
    }

    pub(crate) fn cache_cycle(&mut self, id: InstanceId, cycle: i64) {
        self.annotated = true;
        self.nodes[id.0].instance.cycle = Some(cycle);
    }

    pub(crate) fn cache_module_latency(&mut self, id: InstanceId, latency: i64) {
        self.annotated = true;
        self.nodes[id.0].instance.latency = Some(latency);
    }

    pub(crate) fn set_position(&mut self, id: InstanceId, position: Position) {
        self.annotated = true;
        self.nodes[id.0].instance.position = Some(position);
    }
}
