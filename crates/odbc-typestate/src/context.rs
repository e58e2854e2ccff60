//! Process-scoped entry point.

use std::fmt;

use crate::config::OdbcConfig;
use crate::ffi::NativeApi;

/// Native backend plus configuration shared by a handle tree.
///
/// Every [`crate::Environment`] borrows its context, so the backend
/// outlives all handles allocated through it.
pub struct OdbcContext {
    api: Box<dyn NativeApi>,
    config: OdbcConfig,
}

impl OdbcContext {
    pub fn new(api: impl NativeApi + 'static, config: OdbcConfig) -> Self {
        Self {
            api: Box::new(api),
            config,
        }
    }

    /// Context over the system driver manager.
    #[cfg(feature = "native")]
    pub fn native(config: OdbcConfig) -> Self {
        Self::new(crate::ffi::native::OdbcSys, config)
    }

    pub fn api(&self) -> &dyn NativeApi {
        self.api.as_ref()
    }

    pub const fn config(&self) -> &OdbcConfig {
        &self.config
    }
}

impl fmt::Debug for OdbcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdbcContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
