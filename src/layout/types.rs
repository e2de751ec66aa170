//! Core types for the layout engine

use serde::Serialize;

use crate::definition::{GroupStyle, PortDirection};
use crate::elaborate::{InstanceId, Position};

/// Offset of one port along its module edge, measured from the top
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortOffset {
    pub port: String,
    pub offset: f64,
}

impl PortOffset {
    pub fn new(port: impl Into<String>, offset: f64) -> Self {
        Self {
            port: port.into(),
            offset,
        }
    }
}

/// A port group with its members placed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrangedGroup {
    pub id: String,
    pub style: GroupStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<PortDirection>,
    pub ports: Vec<PortOffset>,
}

/// Canvas coordinates of a grid position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

/// Size of a module box
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModuleSize {
    pub width: f64,
    pub height: f64,
}

/// Result of laying out one module instance
///
/// Child positions are written into the instance graph; this carries the
/// module-level summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLayout {
    /// Highest occupied column, or 0 for an empty module
    pub max_column: i64,
    /// Highest occupied row, or 0 for an empty module
    pub max_row: i64,
    pub size: ModuleSize,
    pub port_groups: Vec<ArrangedGroup>,
    /// Child positions in declaration order
    #[serde(skip)]
    pub placements: Vec<(InstanceId, Position)>,
}
