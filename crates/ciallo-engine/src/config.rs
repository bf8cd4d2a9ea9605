//! Stage configuration.
//!
//! Field capacity, spawn batch, surface size, cadences and backend choice.
//! Configuration is read from and written to TOML files.

use ciallo_common::{CialloError, CialloResult};
use ciallo_kernel::{DEFAULT_CAPACITY, DEFAULT_INDEX_THRESHOLD, DEFAULT_SPAWN_BATCH, MAX_SURFACE_DIM};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Shortest accepted spawn interval.
const MIN_SPAWN_INTERVAL_MS: u64 = 16;

/// How rendered frames leave the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// The loop draws and emits encoded images.
    #[default]
    Encoded,
    /// The loop emits particle layouts and the display context draws.
    Layout,
}

/// Stage configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    // === Field ===
    /// Field capacity
    pub max_texts: usize,
    /// Particles spawned per tick
    pub max_texts_per_draw: usize,

    // === Surface ===
    /// Surface width in pixels
    pub surface_width: u32,
    /// Surface height in pixels
    pub surface_height: u32,

    // === Interaction ===
    /// Pointer presses hit-test particles and keep score
    pub allow_game: bool,
    /// Forwarded untouched on click and hit events
    pub random_audio: bool,

    // === Cadences ===
    /// Milliseconds between spawn ticks
    pub spawn_interval_ms: u64,
    /// Frames per second of the draw cadence
    pub target_fps: u32,

    // === Backend ===
    /// Run the render loop on a worker thread
    pub offload: bool,
    /// Frame payload produced by the render loop
    pub frame_mode: FrameMode,
    /// Particle count from which hit tests use the spatial index
    pub index_threshold: usize,
    /// Content seed (None = random)
    pub seed: Option<u64>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            // Field
            max_texts: DEFAULT_CAPACITY,
            max_texts_per_draw: DEFAULT_SPAWN_BATCH,

            // Surface
            surface_width: 1280,
            surface_height: 720,

            // Interaction
            allow_game: false,
            random_audio: true,

            // Cadences
            spawn_interval_ms: 1000,
            target_fps: 60,

            // Backend
            offload: true,
            frame_mode: FrameMode::Encoded,
            index_threshold: DEFAULT_INDEX_THRESHOLD,
            seed: None,
        }
    }
}

impl StageConfig {
    /// Reads a TOML file and validates it.
    ///
    /// A missing or malformed file yields the defaults. Keys the file leaves
    /// out keep their default values.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                info!("No config at {} ({e}), using defaults", path.display());
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Ignoring malformed config {}: {e}", path.display());
                Self::default()
            },
        }
    }

    /// Writes the configuration as TOML, creating missing directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> CialloResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| CialloError::Config(e.to_string()))?;
        fs::write(path, contents)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Field
        self.max_texts = self.max_texts.clamp(1, 10_000);
        self.max_texts_per_draw = self.max_texts_per_draw.clamp(1, 1000);

        // Surface
        self.surface_width = self.surface_width.clamp(1, MAX_SURFACE_DIM);
        self.surface_height = self.surface_height.clamp(1, MAX_SURFACE_DIM);

        // Cadences
        self.spawn_interval_ms = self.spawn_interval_ms.max(MIN_SPAWN_INTERVAL_MS);
        self.target_fps = self.target_fps.clamp(1, 240);
    }

    /// Time between spawn ticks.
    #[must_use]
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms.max(1))
    }

    /// Time between frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StageConfig::default();
        assert_eq!(config.max_texts, 100);
        assert_eq!(config.max_texts_per_draw, 10);
        assert!(!config.allow_game);
        assert!(config.random_audio);
        assert_eq!(config.spawn_interval(), Duration::from_secs(1));
        assert_eq!(config.frame_mode, FrameMode::Encoded);
    }

    #[test]
    fn test_config_validation() {
        let mut config = StageConfig {
            max_texts: 0,
            max_texts_per_draw: 5000,
            surface_width: 0,
            surface_height: 100_000,
            spawn_interval_ms: 0,
            target_fps: 1000,
            ..StageConfig::default()
        };

        config.validate();

        assert_eq!(config.max_texts, 1);
        assert_eq!(config.max_texts_per_draw, 1000);
        assert_eq!(config.surface_width, 1);
        assert_eq!(config.surface_height, MAX_SURFACE_DIM);
        assert_eq!(config.spawn_interval_ms, 16);
        assert_eq!(config.target_fps, 240);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("ciallo.toml");

        let config = StageConfig {
            max_texts: 250,
            allow_game: true,
            frame_mode: FrameMode::Layout,
            seed: Some(12345),
            ..StageConfig::default()
        };
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = StageConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = StageConfig::load_from("/nonexistent/path/ciallo.toml");
        assert_eq!(config, StageConfig::default());
    }

    #[test]
    fn test_config_load_malformed_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("ciallo.toml");
        fs::write(&config_path, "max_texts = \"lots\"").expect("write");

        assert_eq!(StageConfig::load_from(&config_path), StageConfig::default());
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("ciallo.toml");
        fs::write(&config_path, "max_texts = 0\nframe_mode = \"layout\"\n").expect("write");

        let config = StageConfig::load_from(&config_path);
        assert_eq!(config.max_texts, 1);
        assert_eq!(config.frame_mode, FrameMode::Layout);
        assert_eq!(config.max_texts_per_draw, 10);
    }

    #[test]
    fn test_frame_interval() {
        let config = StageConfig {
            target_fps: 50,
            ..StageConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }
}
