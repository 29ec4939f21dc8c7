//! Hot-swappable configuration handle.
//!
//! Scoring passes and pipeline runs sample the config once at pass start
//! by cloning the `Arc`; a concurrent [`ConfigHandle::swap`] only affects
//! passes that begin afterwards. Invalid configs are rejected at the swap
//! boundary and the previous config stays active.

use std::sync::{Arc, RwLock};

use tracing::info;

use handoff_types::Result;
use handoff_types::config::Config;

/// Shared handle to the active configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    /// Create a handle, validating the initial config.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// The currently active config. Callers hold the returned `Arc` for
    /// the whole pass so a mid-pass swap cannot change their view.
    pub fn current(&self) -> Arc<Config> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Validate and activate a new config.
    ///
    /// # Errors
    ///
    /// Returns the validation error and leaves the active config
    /// untouched.
    pub fn swap(&self, config: Config) -> Result<()> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        info!("configuration swapped");
        Ok(())
    }
}
