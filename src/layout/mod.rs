//! Layout engine for computing clock-cycle columns and grid positions
//!
//! This module takes an elaborated instance graph, annotates cycles and
//! latencies, and places the children of a module on a grid.

pub mod config;
pub mod latency;
pub mod placement;
pub mod port_groups;
pub mod types;

pub use config::{ConfigError, LayoutConfig};
pub use placement::place_module;
pub use port_groups::arrange;
pub use types::*;
