//! Structured logging setup for TableManager

use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration, read from `TABLEMANAGER_LOG_*`
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Filter directive for the crate, e.g. `info` or `debug`
    pub level: String,
    pub format: LogFormat,
    /// Append to this file instead of writing to stdout
    pub file_path: Option<PathBuf>,
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file_path: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("TABLEMANAGER_LOG_LEVEL") {
            config.level = level.to_lowercase();
        }
        if let Some(format) = lookup("TABLEMANAGER_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        config.file_path = lookup("TABLEMANAGER_LOG_FILE").map(PathBuf::from);

        config
    }

    /// RUST_LOG wins when set
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("tablemanager={}", self.level)))
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let layer = fmt::layer().with_timer(UtcTime::rfc_3339());

    let boxed: BoxedLayer = match &config.file_path {
        None => match config.format {
            LogFormat::Pretty => Box::new(layer.pretty()),
            LogFormat::Compact => Box::new(layer.compact()),
            LogFormat::Json => Box::new(layer.json()),
        },
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let layer = layer.with_writer(std::sync::Mutex::new(file)).with_ansi(false);
            match config.format {
                LogFormat::Pretty => Box::new(layer.pretty()),
                LogFormat::Compact => Box::new(layer.compact()),
                LogFormat::Json => Box::new(layer.json()),
            }
        }
    };

    tracing_subscriber::registry()
        .with(boxed.with_filter(config.filter()))
        .try_init()?;

    info!(?config, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("syslog").is_err());
    }

    #[test]
    fn test_config_from_variables() {
        let config = LogConfig::from_lookup(|name| match name {
            "TABLEMANAGER_LOG_LEVEL" => Some("DEBUG".to_string()),
            "TABLEMANAGER_LOG_FORMAT" => Some("bogus".to_string()),
            "TABLEMANAGER_LOG_FILE" => Some("/tmp/tablemanager.log".to_string()),
            _ => None,
        });

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/tablemanager.log")));
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            file_path: Some(dir.path().join("missing").join("tablemanager.log")),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
