//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use super::builder::ConfigBuilder;

/// Environment variable names
mod vars {
    pub const ODBC_DIAG_MESSAGE_CAPACITY: &str = "ODBC_DIAG_MESSAGE_CAPACITY";
    pub const ODBC_MAX_DIAG_RECORDS: &str = "ODBC_MAX_DIAG_RECORDS";
    pub const ODBC_GET_DATA_CHUNK_SIZE: &str = "ODBC_GET_DATA_CHUNK_SIZE";
    pub const ODBC_POLL_INTERVAL_MS: &str = "ODBC_POLL_INTERVAL_MS";
    pub const ODBC_LOG_WARNINGS: &str = "ODBC_LOG_WARNINGS";
}

/// Load configuration from environment variables.
///
/// Unparsable values are ignored with a warning; range validation happens
/// in [`ConfigBuilder::build`].
pub fn load_from_env(mut builder: ConfigBuilder) -> ConfigBuilder {
    if let Some(bytes) = parse_usize(vars::ODBC_DIAG_MESSAGE_CAPACITY) {
        builder = builder.diagnostic_message_capacity(bytes);
    }

    if let Some(records) = parse_usize(vars::ODBC_MAX_DIAG_RECORDS) {
        builder = builder.max_diagnostic_records(records);
    }

    if let Some(bytes) = parse_usize(vars::ODBC_GET_DATA_CHUNK_SIZE) {
        builder = builder.get_data_chunk_size(bytes);
    }

    if let Ok(value) = env::var(vars::ODBC_POLL_INTERVAL_MS)
        && let Ok(millis) = value.parse::<u64>()
    {
        builder = builder.poll_interval(Duration::from_millis(millis));
    }

    if let Ok(value) = env::var(vars::ODBC_LOG_WARNINGS) {
        builder = builder.log_warnings(parse_bool(&value));
    }

    builder
}

fn parse_usize(var: &'static str) -> Option<usize> {
    let value = env::var(var).ok()?;
    match value.trim().parse::<usize>() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(var, value = %value, error = %e, "ignoring unparsable setting");
            None
        }
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::OdbcConfig;

    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        vars::ODBC_DIAG_MESSAGE_CAPACITY,
        vars::ODBC_MAX_DIAG_RECORDS,
        vars::ODBC_GET_DATA_CHUNK_SIZE,
        vars::ODBC_POLL_INTERVAL_MS,
        vars::ODBC_LOG_WARNINGS,
    ];

    /// Runs `f` with exactly `vars` set among the crate's variables.
    pub(crate) fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX.lock().unwrap();

        let old_values: Vec<_> = ALL_VARS.iter().map(|k| (*k, env::var(k).ok())).collect();

        for key in ALL_VARS {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::remove_var(key) };
        }
        for (key, value) in vars {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::set_var(key, value) };
        }

        let result = f();

        for (key, old_value) in old_values {
            match old_value {
                // SAFETY: We hold a mutex lock to ensure no concurrent modifications
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    fn load(vars: &[(&str, &str)]) -> OdbcConfig {
        with_env_vars(vars, || load_from_env(ConfigBuilder::new()).build().unwrap())
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("maybe"));
    }

    #[test]
    fn test_load_no_env_vars() {
        assert_eq!(load(&[]), OdbcConfig::default());
    }

    #[test]
    fn test_load_sizes() {
        let config = load(&[
            ("ODBC_DIAG_MESSAGE_CAPACITY", "128"),
            ("ODBC_MAX_DIAG_RECORDS", "5"),
            ("ODBC_GET_DATA_CHUNK_SIZE", "32"),
        ]);
        assert_eq!(config.diagnostic_message_capacity(), 128);
        assert_eq!(config.max_diagnostic_records(), 5);
        assert_eq!(config.get_data_chunk_size(), 32);
    }

    #[test]
    fn test_load_poll_interval_and_logging() {
        let config = load(&[("ODBC_POLL_INTERVAL_MS", "250"), ("ODBC_LOG_WARNINGS", "off")]);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert!(!config.log_warnings());
    }

    #[test]
    fn test_load_invalid_values_ignored() {
        let config = load(&[
            ("ODBC_GET_DATA_CHUNK_SIZE", "lots"),
            ("ODBC_POLL_INTERVAL_MS", "-3"),
        ]);
        assert_eq!(config.get_data_chunk_size(), 4096);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_zero_chunk_size_fails_build() {
        let result = with_env_vars(&[("ODBC_GET_DATA_CHUNK_SIZE", "0")], || {
            load_from_env(ConfigBuilder::new()).build()
        });
        assert!(result.unwrap_err().is_config());
    }
}
