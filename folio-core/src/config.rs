use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::ZoomConfig;
use crate::ink::InkStyle;
use crate::render::Color;
use crate::shapes::ShapeStyle;

/// Colors used by the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub page_background: Color,
    pub text: Color,
    pub selection: Color,
    pub search_highlight: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            page_background: Color::WHITE,
            text: Color::BLACK,
            selection: Color::rgba(0.2, 0.56, 1.0, 0.3),
            search_highlight: Color::rgba(1.0, 0.85, 0.2, 0.35),
        }
    }
}

/// Viewer configuration, loadable from a TOML file. Every field has a
/// compiled-in default so a missing or partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub zoom: ZoomConfig,
    pub page_gap: f32,
    pub palette: Palette,
    pub ink: InkStyle,
    pub shape: ShapeStyle,
    /// Minimum distance, in document units, between consecutive points of
    /// an ink stroke.
    pub ink_min_distance: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomConfig::default(),
            page_gap: 16.0,
            palette: Palette::default(),
            ink: InkStyle::default(),
            shape: ShapeStyle::default(),
            ink_min_distance: 2.0,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Loads the file when it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let parsed: ViewerConfig = toml::from_str(
            r#"
            page_gap = 24.0

            [zoom]
            min = 0.5
            max = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(parsed.page_gap, 24.0);
        assert_eq!(parsed.zoom.min, 0.5);
        assert_eq!(parsed.zoom.max, 2.0);
        // Untouched fields keep their defaults.
        assert_eq!(parsed.zoom.step, ViewerConfig::default().zoom.step);
        assert_eq!(parsed.palette, Palette::default());
    }

    #[test]
    fn empty_toml_is_the_default_config() {
        let parsed: ViewerConfig = toml::from_str("").unwrap();
        assert_eq!(parsed, ViewerConfig::default());
    }
}
