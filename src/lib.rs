//! Circuit Elaborator - hierarchical circuit templates to positioned instance graphs
//!
//! This library provides an expression evaluator, a definition registry, an
//! elaborator, latency analysis and a grid layout engine for parameterized
//! signal-processing circuits described in JSON.
//!
//! # Example
//!
//! ```rust
//! use circuit_elaborator::elaborate_json;
//!
//! let graph = elaborate_json(r#"{
//!     "entry": "delay_chain",
//!     "modules": {"delay_chain": {
//!         "parameters": {"DELAY": 3},
//!         "inputs": [{"name": "in"}],
//!         "outputs": [{"name": "out"}],
//!         "componentLoops": [{
//!             "iterator": "i",
//!             "range": [0, "${DELAY-1}"],
//!             "components": [{
//!                 "id": "reg_${i}", "type": "reg",
//!                 "inputs": {"in": "${i == 0 ? '$.in' : 'reg_' + (i-1) + '.out'}"}
//!             }]
//!         }],
//!         "outputMappings": {"out": "reg_${DELAY-1}.out"}
//!     }}
//! }"#).unwrap();
//!
//! assert_eq!(graph.module.latency, 3);
//! assert_eq!(graph.components.len(), 3);
//! ```

pub mod definition;
pub mod elaborate;
pub mod error;
pub mod expr;
pub mod layout;
pub mod output;
pub mod validate;

pub use definition::{CircuitDocument, ComponentDefinition, DefinitionRegistry, DocumentError};
pub use elaborate::{ConnectionReference, Elaborator, InstanceGraph};
pub use error::{ElabError, ExpressionError};
pub use expr::{Evaluator, Params, Value};
pub use layout::{ConfigError, LayoutConfig};
pub use output::{render_graph, ElaboratedGraph};
pub use validate::validate_document;

use thiserror::Error;

/// Errors that can occur during the elaboration pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input document could not be read or parsed
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// The layout configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Elaboration, latency analysis or layout failed
    #[error("elaboration error: {0}")]
    Elaboration(#[from] ElabError),
}

/// Configuration for the complete pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Layout configuration
    pub layout: LayoutConfig,
    /// Override parameters for the top-level module
    pub parameters: Params,
}

impl PipelineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the layout configuration
    pub fn with_layout(mut self, config: LayoutConfig) -> Self {
        self.layout = config;
        self
    }

    /// Override one top-level parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Replace all top-level overrides
    pub fn with_parameters(mut self, parameters: Params) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Elaborate and lay out a JSON document with default configuration
pub fn elaborate_json(source: &str) -> Result<ElaboratedGraph, PipelineError> {
    let doc = CircuitDocument::from_json(source)?;
    elaborate_document(&doc, &PipelineConfig::default())
}

/// Elaborate and lay out the entry module of a document
///
/// # Example
///
/// ```rust
/// use circuit_elaborator::{elaborate_document, CircuitDocument, LayoutConfig, PipelineConfig};
///
/// let doc = CircuitDocument::from_json(r#"{
///     "entry": "pair",
///     "modules": {"pair": {
///         "inputs": [{"name": "x"}],
///         "outputs": [{"name": "y"}],
///         "components": [
///             {"id": "a", "type": "reg", "inputs": {"in": "$.x"}},
///             {"id": "b", "type": "reg", "inputs": {"in": "a.out"}}
///         ],
///         "outputMappings": {"y": "b.out"}
///     }}
/// }"#).unwrap();
///
/// let config = PipelineConfig::new()
///     .with_layout(LayoutConfig::default().with_column_spacing(100.0));
/// let graph = elaborate_document(&doc, &config).unwrap();
/// assert_eq!(graph.module.width, 300.0);
/// ```
pub fn elaborate_document(
    doc: &CircuitDocument,
    config: &PipelineConfig,
) -> Result<ElaboratedGraph, PipelineError> {
    let registry = doc.registry()?;
    validate_document(doc, &registry)?;
    run(&registry, &doc.entry, config)
}

/// Elaborate any module of a document as an independent entry point
pub fn elaborate_module(
    doc: &CircuitDocument,
    type_name: &str,
    config: &PipelineConfig,
) -> Result<ElaboratedGraph, PipelineError> {
    let registry = doc.registry()?;
    validate::validate_definitions(doc, &registry, type_name)?;
    run(&registry, type_name, config)
}

fn run(
    registry: &DefinitionRegistry,
    type_name: &str,
    config: &PipelineConfig,
) -> Result<ElaboratedGraph, PipelineError> {
    let mut elaborator = Elaborator::new(registry);
    let mut graph = elaborator.elaborate(type_name, &config.parameters)?;
    tracing::debug!(
        entry = type_name,
        cache_hits = elaborator.evaluator().cache_hits(),
        "expression cache"
    );
    // Every module instance is checked for dependency loops, not only the
    // paths the root's output mappings reach
    layout::latency::analyze(&mut graph)?;
    let root = graph.root();
    Ok(render_graph(&mut graph, root, &config.layout)?)
}
