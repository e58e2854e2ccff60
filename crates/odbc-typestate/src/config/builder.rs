//! Configuration builder

use std::time::Duration;

use crate::error::{Error, Result};

/// Process-scoped tuning for the layer.
///
/// Handed to [`crate::OdbcContext`]; nothing reads configuration from
/// globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdbcConfig {
    diagnostic_message_capacity: usize,
    max_diagnostic_records: usize,
    get_data_chunk_size: usize,
    poll_interval: Duration,
    log_warnings: bool,
}

impl OdbcConfig {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Initial message buffer size for diagnostic retrieval, in bytes.
    #[must_use]
    pub const fn diagnostic_message_capacity(&self) -> usize {
        self.diagnostic_message_capacity
    }

    /// Upper bound on records pulled per diagnostic sequence.
    #[must_use]
    pub const fn max_diagnostic_records(&self) -> usize {
        self.max_diagnostic_records
    }

    /// Chunk size for variable-length `SQLGetData` reads, in bytes.
    #[must_use]
    pub const fn get_data_chunk_size(&self) -> usize {
        self.get_data_chunk_size
    }

    /// Delay between re-issued calls while the driver reports
    /// `StillExecuting`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether warnings attached to successful calls are traced.
    #[must_use]
    pub const fn log_warnings(&self) -> bool {
        self.log_warnings
    }
}

impl Default for OdbcConfig {
    fn default() -> Self {
        let builder = ConfigBuilder::new();
        Self {
            diagnostic_message_capacity: builder.diagnostic_message_capacity,
            max_diagnostic_records: builder.max_diagnostic_records,
            get_data_chunk_size: builder.get_data_chunk_size,
            poll_interval: builder.poll_interval,
            log_warnings: builder.log_warnings,
        }
    }
}

/// Configuration builder with fluent API
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    diagnostic_message_capacity: usize,
    max_diagnostic_records: usize,
    get_data_chunk_size: usize,
    poll_interval: Duration,
    log_warnings: bool,
}

impl ConfigBuilder {
    pub const DEFAULT_DIAGNOSTIC_MESSAGE_CAPACITY: usize = 512;
    pub const DEFAULT_MAX_DIAGNOSTIC_RECORDS: usize = 64;
    pub const DEFAULT_GET_DATA_CHUNK_SIZE: usize = 4096;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            diagnostic_message_capacity: Self::DEFAULT_DIAGNOSTIC_MESSAGE_CAPACITY,
            max_diagnostic_records: Self::DEFAULT_MAX_DIAGNOSTIC_RECORDS,
            get_data_chunk_size: Self::DEFAULT_GET_DATA_CHUNK_SIZE,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            log_warnings: true,
        }
    }

    #[must_use]
    pub const fn diagnostic_message_capacity(mut self, bytes: usize) -> Self {
        self.diagnostic_message_capacity = bytes;
        self
    }

    #[must_use]
    pub const fn max_diagnostic_records(mut self, records: usize) -> Self {
        self.max_diagnostic_records = records;
        self
    }

    #[must_use]
    pub const fn get_data_chunk_size(mut self, bytes: usize) -> Self {
        self.get_data_chunk_size = bytes;
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn log_warnings(mut self, enabled: bool) -> Self {
        self.log_warnings = enabled;
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> Result<OdbcConfig> {
        if self.diagnostic_message_capacity == 0 {
            return Err(Error::config("diagnostic_message_capacity must be non-zero"));
        }
        // Room for the NUL terminator plus at least one byte of data.
        if self.get_data_chunk_size < 2 {
            return Err(Error::config("get_data_chunk_size must be at least 2 bytes"));
        }
        if i16::try_from(self.diagnostic_message_capacity).is_err() {
            return Err(Error::config(format!(
                "diagnostic_message_capacity must not exceed {} bytes",
                i16::MAX
            )));
        }

        Ok(OdbcConfig {
            diagnostic_message_capacity: self.diagnostic_message_capacity,
            max_diagnostic_records: self.max_diagnostic_records,
            get_data_chunk_size: self.get_data_chunk_size,
            poll_interval: self.poll_interval,
            log_warnings: self.log_warnings,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
