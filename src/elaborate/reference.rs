//! Connection references: `$.name[idx]` and `id.port[idx]`

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved symbolic reference to a signal source
///
/// The variant is chosen by the `$.` prefix of the raw string. `index` is
/// present only when a single element of a vector port is selected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConnectionReference {
    /// An input port of the enclosing module
    #[serde(rename = "moduleInput", rename_all = "camelCase")]
    ModuleInput {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// An output port of a sibling component
    #[serde(rename = "componentOutput", rename_all = "camelCase")]
    ComponentOutput {
        component_id: String,
        port_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
}

impl ConnectionReference {
    /// Parse a raw reference string; the error is a human-readable reason
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix("$.") {
            let (name, index) = split_index(rest)?;
            check_name(name, "module input")?;
            return Ok(ConnectionReference::ModuleInput {
                name: name.to_string(),
                index,
            });
        }

        let (component, port) = trimmed
            .split_once('.')
            .ok_or_else(|| "expected '$.input' or 'component.port'".to_string())?;
        check_name(component, "component id")?;
        let (port, index) = split_index(port)?;
        check_name(port, "port name")?;
        Ok(ConnectionReference::ComponentOutput {
            component_id: component.to_string(),
            port_name: port.to_string(),
            index,
        })
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            ConnectionReference::ModuleInput { index, .. }
            | ConnectionReference::ComponentOutput { index, .. } => *index,
        }
    }

    /// The sibling component this reference reads from, if any
    pub fn component_id(&self) -> Option<&str> {
        match self {
            ConnectionReference::ComponentOutput { component_id, .. } => Some(component_id),
            ConnectionReference::ModuleInput { .. } => None,
        }
    }

    /// The referenced port name
    pub fn port_name(&self) -> &str {
        match self {
            ConnectionReference::ModuleInput { name, .. } => name,
            ConnectionReference::ComponentOutput { port_name, .. } => port_name,
        }
    }
}

impl fmt::Display for ConnectionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionReference::ModuleInput { name, .. } => write!(f, "$.{}", name)?,
            ConnectionReference::ComponentOutput {
                component_id,
                port_name,
                ..
            } => write!(f, "{}.{}", component_id, port_name)?,
        }
        if let Some(i) = self.index() {
            write!(f, "[{}]", i)?;
        }
        Ok(())
    }
}

/// Split `name[3]` into `("name", Some(3))`
fn split_index(s: &str) -> Result<(&str, Option<usize>), String> {
    match s.split_once('[') {
        None => {
            if s.contains(']') {
                return Err("unbalanced ']'".to_string());
            }
            Ok((s, None))
        }
        Some((name, rest)) => {
            let digits = rest
                .strip_suffix(']')
                .ok_or_else(|| "missing closing ']'".to_string())?;
            let index = digits
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("malformed index '{}'", digits))?;
            Ok((name, Some(index)))
        }
    }
}

fn check_name(name: &str, what: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("empty {}", what));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("invalid {} '{}'", what, name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_input() {
        assert_eq!(
            ConnectionReference::parse("$.x").unwrap(),
            ConnectionReference::ModuleInput {
                name: "x".into(),
                index: None
            }
        );
        assert_eq!(
            ConnectionReference::parse("$.bus[3]").unwrap(),
            ConnectionReference::ModuleInput {
                name: "bus".into(),
                index: Some(3)
            }
        );
    }

    #[test]
    fn test_parse_component_output() {
        assert_eq!(
            ConnectionReference::parse("reg_0.out").unwrap(),
            ConnectionReference::ComponentOutput {
                component_id: "reg_0".into(),
                port_name: "out".into(),
                index: None
            }
        );
        let r = ConnectionReference::parse("mul1.out[1]").unwrap();
        assert_eq!(r.index(), Some(1));
        assert_eq!(r.component_id(), Some("mul1"));
    }

    #[test]
    fn test_display_matches_source_form() {
        for raw in ["$.x", "$.bus[2]", "reg_0.out", "m.out[0]"] {
            assert_eq!(ConnectionReference::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_malformed_references() {
        for raw in ["", "noport", "a.b.c", "$.", "a.out[", "a.out[x]", "a.out]", ".out", "a.", "$.x[-1]"] {
            assert!(ConnectionReference::parse(raw).is_err(), "'{}' should fail", raw);
        }
    }

    #[test]
    fn test_serialize_structured() {
        let r = ConnectionReference::parse("reg_2.out").unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "componentOutput", "componentId": "reg_2", "portName": "out"})
        );
    }
}
