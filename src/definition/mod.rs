//! Component templates and the registry that stores them
//!
//! A definition is either a primitive (fixed ports and latency, no internal
//! structure) or a module (internal components, loops and output mappings).
//!
//! # Example
//!
//! ```json
//! {
//!   "entry": "delay_chain",
//!   "modules": {
//!     "delay_chain": {
//!       "parameters": {"DELAY": 3},
//!       "inputs": [{"name": "in"}],
//!       "outputs": [{"name": "out"}],
//!       "componentLoops": [{
//!         "iterator": "i",
//!         "range": [0, "${DELAY-1}"],
//!         "components": [{
//!           "id": "reg_${i}", "type": "reg",
//!           "inputs": {"in": "${i == 0 ? '$.in' : 'reg_' + (i-1) + '.out'}"}
//!         }]
//!       }],
//!       "outputMappings": {"out": "reg_${DELAY-1}.out"}
//!     }
//!   }
//! }
//! ```

mod document;
mod registry;
mod types;

pub use document::{CircuitDocument, DocumentError};
pub use registry::{builtin_definitions, DefinitionRegistry, INPUT, OUTPUT, REGISTER};
pub use types::{
    ComponentDefinition, ComponentRef, GroupStyle, LoopDef, PortDef, PortDirection,
    PortGroupDef, RawBinding,
};
