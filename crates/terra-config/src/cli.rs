//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "terra", about = "Planetary surface tile renderer")]
pub struct CliArgs {
    /// Body to render.
    #[arg(long)]
    pub body: Option<String>,

    /// Deepest surface level (1 to 14).
    #[arg(long)]
    pub max_level: Option<u8>,

    /// Load every tile texture before the first frame.
    #[arg(long)]
    pub preload: Option<bool>,

    /// Number of frames to render.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Starting altitude in body radii.
    #[arg(long)]
    pub altitude: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref body) = args.body {
            self.surface.body = body.clone();
        }
        if let Some(level) = args.max_level {
            self.surface.max_level = level;
        }
        if let Some(preload) = args.preload {
            self.surface.preload = preload;
        }
        if let Some(frames) = args.frames {
            self.view.frames = frames;
        }
        if let Some(altitude) = args.altitude {
            self.view.start_altitude = altitude;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            body: Some("Titan".to_string()),
            max_level: Some(10),
            altitude: Some(0.5),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.surface.body, "Titan");
        assert_eq!(config.surface.max_level, 10);
        assert_eq!(config.view.start_altitude, 0.5);
        // Non-overridden fields retain defaults
        assert!(!config.surface.preload);
        assert_eq!(config.view.frames, 600);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "terra",
            "--body",
            "Moon",
            "--preload",
            "true",
            "--frames",
            "20",
        ]);
        assert_eq!(args.body.as_deref(), Some("Moon"));
        assert_eq!(args.preload, Some(true));
        assert_eq!(args.frames, Some(20));
        assert!(args.config.is_none());
    }
}
