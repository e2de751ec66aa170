//! Configuration for the layout engine

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::CanvasPoint;
use crate::elaborate::Position;

/// Errors that can occur when loading a layout configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read layout config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse layout config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid layout config: {0}")]
    Invalid(String),
}

/// Spacing and sizing options for grid placement
///
/// Keys missing from a TOML file fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Horizontal distance between two clock-cycle columns
    pub column_spacing: f64,

    /// Vertical distance between two rows
    pub row_spacing: f64,

    /// Distance between adjacent ports on a module edge
    pub port_spacing: f64,

    /// Floor for computed module heights
    pub min_module_height: f64,

    /// Extra height added around the port column
    pub module_padding: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_spacing: 120.0,
            row_spacing: 60.0,
            port_spacing: 20.0,
            min_module_height: 80.0,
            module_padding: 20.0,
        }
    }
}

impl LayoutConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// All spacings must be positive and finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("column_spacing", self.column_spacing),
            ("row_spacing", self.row_spacing),
            ("port_spacing", self.port_spacing),
            ("min_module_height", self.min_module_height),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "{} must be a positive number, got {}",
                name, value
            )));
        }
        if !(self.module_padding.is_finite() && self.module_padding >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "module_padding must not be negative, got {}",
                self.module_padding
            )));
        }
        Ok(())
    }

    /// Scale a grid position by the column and row spacing
    pub fn canvas_point(&self, position: Position) -> CanvasPoint {
        CanvasPoint {
            x: position.x as f64 * self.column_spacing,
            y: position.y as f64 * self.row_spacing,
        }
    }

    pub fn with_column_spacing(mut self, spacing: f64) -> Self {
        self.column_spacing = spacing;
        self
    }

    pub fn with_row_spacing(mut self, spacing: f64) -> Self {
        self.row_spacing = spacing;
        self
    }

    pub fn with_port_spacing(mut self, spacing: f64) -> Self {
        self.port_spacing = spacing;
        self
    }

    /// Set the minimum module height
    pub fn with_min_module_height(mut self, height: f64) -> Self {
        self.min_module_height = height;
        self
    }

    pub fn with_module_padding(mut self, padding: f64) -> Self {
        self.module_padding = padding;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LayoutConfig::default();
        assert_eq!(config.column_spacing, 120.0);
        assert_eq!(config.min_module_height, 80.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = LayoutConfig::new()
            .with_column_spacing(200.0)
            .with_port_spacing(10.0);
        assert_eq!(config.column_spacing, 200.0);
        assert_eq!(config.port_spacing, 10.0);
        assert_eq!(config.row_spacing, 60.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = LayoutConfig::from_toml_str("column_spacing = 90.0\n").unwrap();
        assert_eq!(config.column_spacing, 90.0);
        assert_eq!(config.port_spacing, 20.0);
    }

    #[test]
    fn test_invalid_toml_error() {
        let result = LayoutConfig::from_toml_str("this is not valid toml {{{{");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(LayoutConfig::from_toml_str("colum_spacing = 90.0\n").is_err());
    }

    #[test]
    fn test_non_positive_spacing_rejected() {
        let result = LayoutConfig::from_toml_str("row_spacing = 0.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_canvas_point_scales_grid() {
        let config = LayoutConfig::new()
            .with_column_spacing(100.0)
            .with_row_spacing(40.0);
        assert_eq!(
            config.canvas_point(Position::new(2, 3)),
            CanvasPoint { x: 200.0, y: 120.0 }
        );
    }

    #[test]
    fn test_height_builders() {
        let config = LayoutConfig::new()
            .with_min_module_height(50.0)
            .with_module_padding(0.0);
        assert_eq!(config.min_module_height, 50.0);
        assert_eq!(config.module_padding, 0.0);
        assert!(config.validate().is_ok());
    }
}
