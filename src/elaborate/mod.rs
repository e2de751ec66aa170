//! Elaboration: expanding templates into a concrete instance graph
//!
//! Parameters are merged and evaluated, loops unrolled, and every connection
//! string parsed into a [`ConnectionReference`] that has been checked against
//! the enclosing module before the graph is returned.

mod elaborator;
mod instance;
mod reference;

pub use elaborator::Elaborator;
pub use instance::{
    ComponentInstance, InputConnection, InstanceGraph, InstanceId, ModuleBody, OutputMapping,
    Port, PortGroup, Position,
};
pub use reference::ConnectionReference;
