//! Fluent builder for [`Dispatcher`].

use std::path::Path;

use anyhow::Context;

use crate::config::{DispatchConfig, OverflowPolicy, RegionConfig};
use crate::core::{AppResult, DispatchError, Dispatcher, EventSink, StdoutEventSink};

/// Builder assembling a [`DispatchConfig`] and an event sink.
pub struct DispatcherBuilder {
    config: DispatchConfig,
    sink: Option<Box<dyn EventSink>>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    /// Start from an empty configuration with default pool settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: DispatchConfig::default(),
            sink: None,
        }
    }

    /// Start from an existing configuration.
    #[must_use]
    pub const fn from_config(config: DispatchConfig) -> Self {
        Self { config, sink: None }
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not hold a valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading dispatch config {}", path.display()))?;
        let config = DispatchConfig::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("parsing dispatch config {}", path.display()))?;
        Ok(Self::from_config(config))
    }

    /// Add or replace a region.
    #[must_use]
    pub fn region(mut self, name: impl Into<String>, max_simultaneous_jobs: u32) -> Self {
        self.config
            .regions
            .insert(name.into(), RegionConfig { max_simultaneous_jobs });
        self
    }

    /// Enable or disable job event logging.
    #[must_use]
    pub const fn log_events(mut self, enabled: bool) -> Self {
        self.config.log_events = enabled;
        self
    }

    /// Set the worker pool capacity.
    #[must_use]
    pub const fn worker_capacity(mut self, capacity: usize) -> Self {
        self.config.worker_pool.capacity = capacity;
        self
    }

    /// Set the worker pool overflow policy.
    #[must_use]
    pub const fn overflow_policy(mut self, overflow: OverflowPolicy) -> Self {
        self.config.worker_pool.overflow = overflow;
        self
    }

    /// Route job events to `sink` instead of stdout.
    #[must_use]
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Configuration assembled so far.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Validate the configuration, start the regions, and return the dispatcher.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidConfig` if the configuration is invalid
    /// - `DispatchError::Spawn` if an executor thread cannot be started
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let sink = self.sink.unwrap_or_else(|| Box::new(StdoutEventSink));
        Dispatcher::with_sink(self.config, sink)
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_config() {
        let builder = DispatcherBuilder::new()
            .region("North", 2)
            .region("South", 3)
            .log_events(true)
            .worker_capacity(5)
            .overflow_policy(OverflowPolicy::Block);

        let config = builder.config();
        assert_eq!(config.regions.len(), 2);
        assert!(config.log_events);
        assert_eq!(config.worker_pool.capacity, 5);
        assert_eq!(config.worker_pool.overflow, OverflowPolicy::Block);
    }

    #[test]
    fn test_builder_rejects_empty_config() {
        let err = DispatcherBuilder::new().build().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_rejects_zero_capacity_region() {
        let err = DispatcherBuilder::new().region("North", 0).build().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = DispatcherBuilder::from_json_file("/nonexistent/dispatch.json").unwrap_err();
        assert!(err.to_string().contains("reading dispatch config"));
    }
}
