//! TOML configuration file loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::builder::ConfigBuilder;
use crate::error::{Error, Result};

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./odbc-typestate.toml",
    "~/.config/odbc-typestate/config.toml",
    "/etc/odbc-typestate/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        Error::config(format!(
            "failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(apply_file_config(builder, file_config))
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> ConfigBuilder {
    if let Some(diag) = config.diagnostics {
        if let Some(bytes) = diag.message_capacity {
            builder = builder.diagnostic_message_capacity(bytes);
        }

        if let Some(records) = diag.max_records {
            builder = builder.max_diagnostic_records(records);
        }
    }

    if let Some(fetch) = config.fetch {
        if let Some(bytes) = fetch.chunk_size {
            builder = builder.get_data_chunk_size(bytes);
        }

        if let Some(millis) = fetch.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(millis));
        }
    }

    if let Some(logging) = config.logging
        && let Some(enabled) = logging.warnings
    {
        builder = builder.log_warnings(enabled);
    }

    builder
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    diagnostics: Option<DiagnosticsFileConfig>,
    fetch: Option<FetchFileConfig>,
    logging: Option<LoggingFileConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiagnosticsFileConfig {
    message_capacity: Option<usize>,
    max_records: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FetchFileConfig {
    chunk_size: Option<usize>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingFileConfig {
    warnings: Option<bool>,
}
