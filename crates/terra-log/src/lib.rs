//! Structured logging for Terra.
//!
//! Installs a `tracing` subscriber with an uptime-stamped console layer that
//! shows thread names (the texture loader runs on `tile-loader`), plus a JSON
//! file layer in debug builds. `RUST_LOG` takes precedence over the level set
//! in the configuration.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use terra_config::Config;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file inside the log directory.
pub const LOG_FILE: &str = "terra.log";

/// Install the global subscriber.
///
/// `log_dir` receives [`LOG_FILE`] when `debug_build` is set and the config
/// does not disable file logging. Fails if a global subscriber is already set.
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<(), TryInitError> {
    let directives = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let file = open_log_file(log_dir, debug_build, config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer())
        .with(file.map(json_layer))
        .try_init()
}

/// Filter directives taken from the config, or [`DEFAULT_FILTER`].
pub fn filter_directives(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime())
}

fn json_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime())
        .json()
}

fn open_log_file(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) -> Option<File> {
    let wanted = debug_build && config.is_none_or(|c| c.debug.log_to_file);
    if wanted
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(file) = File::create(log_dir.join(LOG_FILE))
    {
        Some(file)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(filter_directives(None), "info");
        assert!(default_env_filter().to_string().contains("info"));
    }

    /// The configured level wins unless it is blank.
    #[test]
    fn test_filter_from_config() {
        let mut config = Config::default();
        config.debug.log_level = "debug,terra_tiles=trace".to_string();
        assert_eq!(filter_directives(Some(&config)), "debug,terra_tiles=trace");

        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_env_filter_parsing() {
        for directives in ["info", "warn,terra_tiles::cache=debug", "error"] {
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
    }

    /// File logging needs a debug build, a directory and the config switch.
    #[test]
    fn test_log_file_conditions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_log_file(Some(dir.path()), false, None).is_none());
        assert!(open_log_file(None, true, None).is_none());

        let mut config = Config::default();
        config.debug.log_to_file = false;
        assert!(open_log_file(Some(dir.path()), true, Some(&config)).is_none());

        let nested = dir.path().join("logs");
        assert!(open_log_file(Some(&nested), true, None).is_some());
        assert!(nested.join(LOG_FILE).exists());
    }

    /// Events reach the file as one JSON object per line.
    #[test]
    fn test_json_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_log_file(Some(dir.path()), true, None).unwrap();
        let subscriber = tracing_subscriber::registry().with(json_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(archive = "Mars_tile.tex", offset = 64u64, "no texture at archive offset");
        });

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "no texture at archive offset");
        assert_eq!(line["fields"]["archive"], "Mars_tile.tex");
        assert_eq!(line["fields"]["offset"], 64);
    }
}
