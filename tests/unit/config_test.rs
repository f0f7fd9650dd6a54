//! Tests for configuration validation

use std::collections::HashMap;

use prometheus_dispatch::config::{DispatchConfig, OverflowPolicy, RegionConfig, WorkerPoolConfig};

fn regions(pairs: &[(&str, u32)]) -> HashMap<String, RegionConfig> {
    pairs
        .iter()
        .map(|(name, max)| ((*name).to_string(), RegionConfig { max_simultaneous_jobs: *max }))
        .collect()
}

#[test]
fn test_dispatch_config_validation() {
    let valid = DispatchConfig {
        regions: regions(&[("North", 2), ("South", 3)]),
        log_events: false,
        worker_pool: WorkerPoolConfig::default(),
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_dispatch_config_empty_regions() {
    let config = DispatchConfig::default();
    assert!(config.validate().is_err());
}

#[test]
fn test_dispatch_config_invalid_region() {
    let config = DispatchConfig {
        regions: regions(&[("North", 0)]),
        ..DispatchConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_dispatch_config_blank_region_name() {
    let config = DispatchConfig {
        regions: regions(&[("  ", 1)]),
        ..DispatchConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_worker_pool_config_invalid_capacity() {
    let config = WorkerPoolConfig {
        capacity: 0,
        overflow: OverflowPolicy::Reject,
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_dispatch_config_from_json() {
    let json = r#"{
        "regions": {
            "North": { "max_simultaneous_jobs": 50 },
            "South": { "max_simultaneous_jobs": 50 }
        },
        "log_events": true,
        "worker_pool": { "capacity": 10, "overflow": "block" }
    }"#;

    let config = DispatchConfig::from_json_str(json).unwrap();
    assert_eq!(config.regions.len(), 2);
    assert!(config.log_events);
    assert_eq!(config.worker_pool.capacity, 10);
    assert_eq!(config.worker_pool.overflow, OverflowPolicy::Block);
}

#[test]
fn test_dispatch_config_json_defaults() {
    let json = r#"{ "regions": { "North": { "max_simultaneous_jobs": 1 } } }"#;
    let config = DispatchConfig::from_json_str(json).unwrap();
    assert!(!config.log_events);
    assert_eq!(config.worker_pool.capacity, 999);
    assert_eq!(config.worker_pool.overflow, OverflowPolicy::Reject);
}

#[test]
fn test_dispatch_config_json_parse_error() {
    assert!(DispatchConfig::from_json_str("{ not json").is_err());
}

#[test]
fn test_overflow_policy_from_str() {
    assert_eq!("Block".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Block);
    assert_eq!(" reject ".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Reject);
    assert!("drop".parse::<OverflowPolicy>().is_err());
}
