//! Engine configuration, loaded from RON files

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON or does not match the schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Output surface dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output surface
    pub window: WindowConfig,
    /// Frame clear color, RGBA
    pub clear_color: [f32; 4],
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from RON text
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a configuration file, falling back to defaults if it is absent
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("config '{}' not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Aspect ratio of the configured window
    pub fn aspect(&self) -> f32 {
        self.window.width as f32 / self.window.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_fills_defaults() {
        let config = EngineConfig::from_ron(
            "(window: (width: 800, height: 600), clear_color: (0.1, 0.2, 0.3, 1.0))",
        )
        .unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.clear_color[2], 0.3);
        // Unspecified fields come from Default.
        assert_eq!(config.fov_degrees, 45.0);
    }

    #[test]
    fn test_bad_ron_is_an_error() {
        assert!(EngineConfig::from_ron("(window: oops)").is_err());
    }
}
