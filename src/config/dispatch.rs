//! Dispatcher, region, and worker pool configuration structures.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::DEFAULT_POOL_CAPACITY;

/// Environment variable holding `name=max` region pairs, comma separated.
pub const ENV_REGIONS: &str = "DISPATCH_REGIONS";
/// Environment variable enabling job event logging.
pub const ENV_LOG_EVENTS: &str = "DISPATCH_LOG_EVENTS";
/// Environment variable overriding the worker pool capacity.
pub const ENV_WORKER_CAPACITY: &str = "DISPATCH_WORKER_CAPACITY";
/// Environment variable selecting the worker pool overflow policy.
pub const ENV_WORKER_OVERFLOW: &str = "DISPATCH_WORKER_OVERFLOW";

/// What adding a worker to a full pool does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail immediately and report `false`.
    ///
    /// A job handing its worker back to a full pool drops the worker and
    /// logs an error.
    #[default]
    Reject,
    /// Wait until a worker is taken out.
    ///
    /// Jobs handing their worker back wait too, holding their region slot,
    /// until room frees or the dispatcher is cancelled.
    Block,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "block" => Ok(Self::Block),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

const fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum number of idle workers.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Behaviour when adding to a full pool.
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl WorkerPoolConfig {
    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("worker pool capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Region configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Maximum number of jobs the region runs at once.
    pub max_simultaneous_jobs: u32,
}

impl RegionConfig {
    /// Validate region configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_simultaneous_jobs == 0 {
            return Err("max_simultaneous_jobs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root dispatcher configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Map of region name to configuration.
    pub regions: HashMap<String, RegionConfig>,
    /// Whether job events are written to the event sink.
    #[serde(default)]
    pub log_events: bool,
    /// Shared worker pool settings.
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
}

impl DispatchConfig {
    /// Validate all regions and the pool, and ensure at least one region exists.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.regions.is_empty() {
            return Err("at least one region must be defined".into());
        }
        for (name, region) in &self.regions {
            if name.trim().is_empty() {
                return Err("region names must not be empty".into());
            }
            region
                .validate()
                .map_err(|e| format!("region `{name}` invalid: {e}"))?;
        }
        self.worker_pool.validate()
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then read configuration from the environment.
    ///
    /// # Errors
    ///
    /// Same as [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine; real environment variables still apply.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup (`DISPATCH_*` variables).
    ///
    /// # Errors
    ///
    /// Returns a description of a malformed or missing value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let regions = lookup(ENV_REGIONS).ok_or_else(|| format!("{ENV_REGIONS} is not set"))?;
        let mut cfg = Self {
            regions: parse_regions(&regions)?,
            ..Self::default()
        };

        if let Some(raw) = lookup(ENV_LOG_EVENTS) {
            cfg.log_events = parse_flag(&raw)
                .ok_or_else(|| format!("{ENV_LOG_EVENTS}: invalid flag `{raw}`"))?;
        }
        if let Some(raw) = lookup(ENV_WORKER_CAPACITY) {
            cfg.worker_pool.capacity = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_WORKER_CAPACITY}: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_WORKER_OVERFLOW) {
            cfg.worker_pool.overflow = raw
                .parse()
                .map_err(|e| format!("{ENV_WORKER_OVERFLOW}: {e}"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Parse `North=2,South=3` into region configs.
fn parse_regions(raw: &str) -> Result<HashMap<String, RegionConfig>, String> {
    let mut regions = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, max) = entry
            .split_once('=')
            .ok_or_else(|| format!("{ENV_REGIONS}: expected `name=max`, got `{entry}`"))?;
        let name = name.trim().to_string();
        let max_simultaneous_jobs = max
            .trim()
            .parse()
            .map_err(|e| format!("{ENV_REGIONS}: region `{name}`: {e}"))?;
        if regions
            .insert(name.clone(), RegionConfig { max_simultaneous_jobs })
            .is_some()
        {
            return Err(format!("{ENV_REGIONS}: duplicate region `{name}`"));
        }
    }
    Ok(regions)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let cfg = DispatchConfig::from_lookup(lookup(&[
            (ENV_REGIONS, "North=2, South=3"),
            (ENV_LOG_EVENTS, "yes"),
            (ENV_WORKER_CAPACITY, "10"),
            (ENV_WORKER_OVERFLOW, "block"),
        ]))
        .unwrap();

        assert_eq!(cfg.regions["North"].max_simultaneous_jobs, 2);
        assert_eq!(cfg.regions["South"].max_simultaneous_jobs, 3);
        assert!(cfg.log_events);
        assert_eq!(cfg.worker_pool.capacity, 10);
        assert_eq!(cfg.worker_pool.overflow, OverflowPolicy::Block);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let cfg = DispatchConfig::from_lookup(lookup(&[(ENV_REGIONS, "North=1")])).unwrap();
        assert!(!cfg.log_events);
        assert_eq!(cfg.worker_pool, WorkerPoolConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_bad_input() {
        assert!(DispatchConfig::from_lookup(lookup(&[])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[(ENV_REGIONS, "North")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[(ENV_REGIONS, "North=x")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[(ENV_REGIONS, "North=1,North=2")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[(ENV_REGIONS, "North=0")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[
            (ENV_REGIONS, "North=1"),
            (ENV_LOG_EVENTS, "maybe"),
        ]))
        .is_err());
    }
}
