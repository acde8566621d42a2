// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Kestrel".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// "perspective" or "orthographic"
    pub projection: String,
    pub fov_y_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.02, 0.02, 0.05, 1.0],
            max_frames_in_flight: 2,
            projection: "perspective".to_string(),
            fov_y_degrees: 60.0,
            near_plane: 0.1,
            far_plane: 100.0,
        }
    }
}

/// Shader sources for the demo geometry
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    /// Watch the shader files and rebake geometry on change
    pub hot_reload: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/mesh.vert.spv"),
            fragment: PathBuf::from("shaders/mesh.frag.spv"),
            hot_reload: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

impl GraphicsConfig {
    /// Present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn use_orthographic(&self) -> bool {
        self.projection.eq_ignore_ascii_case("orthographic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert!(!config.graphics.use_orthographic());
        assert_eq!(
            config.graphics.present_mode(),
            ash::vk::PresentModeKHR::FIFO
        );
        assert!(config.shaders.vertex.to_string_lossy().ends_with(".spv"));
    }

    #[test]
    fn parses_full_document() {
        let config: Config = toml::from_str(
            r#"
            [window]
            title = "demo"
            width = 640
            height = 480
            fullscreen = true

            [graphics]
            present_mode = "mailbox"
            clear_color = [0.1, 0.2, 0.3, 1.0]
            max_frames_in_flight = 3
            projection = "orthographic"

            [shaders]
            vertex = "out/custom.vert.spv"
            fragment = "out/custom.frag.spv"
            hot_reload = false

            [debug]
            validation_layers = false
            show_fps = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "demo");
        assert!(config.window.fullscreen);
        assert_eq!(
            config.graphics.present_mode(),
            ash::vk::PresentModeKHR::MAILBOX
        );
        assert!(config.graphics.use_orthographic());
        assert_eq!(config.shaders.vertex, PathBuf::from("out/custom.vert.spv"));
        assert!(!config.shaders.hot_reload);
        assert!(!config.debug.validation_layers);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let graphics = GraphicsConfig {
            present_mode: "vsync-maybe".to_string(),
            ..GraphicsConfig::default()
        };
        assert_eq!(graphics.present_mode(), ash::vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.present_mode, "fifo");
    }
}
