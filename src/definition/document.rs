//! The hierarchical JSON input document

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::registry::DefinitionRegistry;
use super::types::ComponentDefinition;

/// Errors that can occur when loading a circuit document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to read circuit file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse circuit JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed definition '{name}': {reason}")]
    Malformed { name: String, reason: String },
}

/// A circuit description: entry point plus module and primitive definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitDocument {
    /// Name of the module elaborated by default
    #[serde(alias = "topModule")]
    pub entry: String,
    #[serde(default)]
    pub modules: BTreeMap<String, ComponentDefinition>,
    #[serde(default)]
    pub primitives: BTreeMap<String, ComponentDefinition>,
}

impl CircuitDocument {
    /// Parse a document from JSON text
    pub fn from_json(source: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a document from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Build a registry: builtins, then document primitives, then modules
    ///
    /// Entries under `primitives` are always primitives and entries under
    /// `modules` never are, whatever their `isPrimitive` flag says.
    pub fn registry(&self) -> Result<DefinitionRegistry, DocumentError> {
        let mut registry = DefinitionRegistry::new();

        for (name, def) in &self.primitives {
            let mut def = def.clone();
            def.is_primitive = true;
            if !def.is_well_formed() {
                return Err(DocumentError::Malformed {
                    name: name.clone(),
                    reason: "a primitive cannot declare components or output mappings".into(),
                });
            }
            registry.register(name.clone(), def);
        }

        for (name, def) in &self.modules {
            let mut def = def.clone();
            def.is_primitive = false;
            registry.register(name.clone(), def);
        }

        Ok(registry)
    }
}
