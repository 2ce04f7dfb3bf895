//! Configuration sections, defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration.
pub const CONFIG_FILE: &str = "config.ron";

/// Deepest quadtree level the renderer supports.
const MAX_LEVEL_LIMIT: u8 = 14;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub surface: SurfaceConfig,
    pub lod: LodConfig,
    pub cache: CacheConfig,
    pub view: ViewConfig,
    pub debug: DebugConfig,
}

/// Which body to render and which surface features to enable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Body name; archive file names derive from it.
    pub body: String,
    /// Deepest level rendered (1 to 14).
    pub max_level: u8,
    /// Water reflections.
    pub specular: bool,
    /// Night lights.
    pub lights: bool,
    /// Load every tile texture up front.
    pub preload: bool,
    /// Added to the requested level before clamping.
    pub resolution_bias: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            body: "Mars".to_string(),
            max_level: MAX_LEVEL_LIMIT,
            specular: true,
            lights: true,
            preload: false,
            resolution_bias: 0.0,
        }
    }
}

/// Tuning of the resolution heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Per-frame camera step tolerated at level 14, times `2^14`.
    pub motion_step_base: f64,
    /// Fast motion never lowers the target below this level.
    pub motion_floor_level: u8,
    pub tilt_stepdown_slope: f64,
    pub tilt_coarse_slope: f64,
    pub tilt_bias: f64,
    /// Camera distance in body radii the tilt is judged from.
    pub tilt_reference_dist: f64,
    /// First level at which oblique tiles stop subdividing.
    pub oblique_min_level: u8,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            motion_step_base: 5.12,
            motion_floor_level: 5,
            tilt_stepdown_slope: 2.0,
            tilt_coarse_slope: 4.2,
            tilt_bias: 0.3,
            tilt_reference_dist: 1.05,
            oblique_min_level: 8,
        }
    }
}

/// Loader queue and node pool limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Outstanding load requests.
    pub queue_capacity: usize,
    /// Loader wake-up interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Live tile nodes across all bodies.
    pub max_nodes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            poll_interval_ms: 20,
            max_nodes: 1 << 20,
        }
    }
}

/// Viewport and the scripted approach flown by the driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Vertical field of view in degrees.
    pub field_of_view_deg: f64,
    /// Frames to render.
    pub frames: u32,
    /// Starting altitude in body radii.
    pub start_altitude: f64,
    /// Final altitude in body radii.
    pub end_altitude: f64,
    /// Longitude advanced per frame, degrees.
    pub orbit_step_deg: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            viewport_height: 1080,
            field_of_view_deg: 40.0,
            frames: 600,
            start_altitude: 3.0,
            end_altitude: 0.002,
            orbit_step_deg: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter, e.g. "debug" or "info,terra_tiles=trace".
    pub log_level: String,
    /// Write a JSON log file in debug builds.
    pub log_to_file: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
        }
    }
}

/// `<os config dir>/terra`, or `./terra` when the OS has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terra")
}

impl Config {
    /// Load config from `config_dir`, or write and return the defaults.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            let config = Self::read(&path)?;
            log::info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to `config_dir` as [`CONFIG_FILE`].
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, serialized).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-read the file; `Some` only if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_LEVEL_LIMIT).contains(&self.surface.max_level) {
            return Err(ConfigError::Invalid {
                field: "surface.max_level",
                reason: format!("{} is outside 1..={MAX_LEVEL_LIMIT}", self.surface.max_level),
            });
        }
        if self.surface.body.is_empty() {
            return Err(ConfigError::Invalid {
                field: "surface.body",
                reason: "empty body name".to_string(),
            });
        }
        if self.cache.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.view.field_of_view_deg > 0.0 && self.view.field_of_view_deg < 180.0) {
            return Err(ConfigError::Invalid {
                field: "view.field_of_view_deg",
                reason: format!("{} is outside (0, 180)", self.view.field_of_view_deg),
            });
        }
        if !(self.lod.tilt_reference_dist > 1.0) {
            return Err(ConfigError::Invalid {
                field: "lod.tilt_reference_dist",
                reason: format!("{} must exceed one body radius", self.lod.tilt_reference_dist),
            });
        }
        if self.view.end_altitude < 0.0 || self.view.start_altitude < self.view.end_altitude {
            return Err(ConfigError::Invalid {
                field: "view.end_altitude",
                reason: "altitudes must satisfy 0 <= end <= start".to_string(),
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
