//! Tests for error types

use prometheus_dispatch::core::{DispatchError, Rejection};

#[test]
fn test_unknown_region_error() {
    let err = DispatchError::UnknownRegion("West".to_string());
    assert_eq!(format!("{}", err), "unknown region: West");
}

#[test]
fn test_cancelled_error() {
    assert_eq!(format!("{}", DispatchError::Cancelled), "job cancelled");
}

#[test]
fn test_timeout_error() {
    assert_eq!(format!("{}", DispatchError::Timeout), "operation timed out");
}

#[test]
fn test_invalid_config_error() {
    let err = DispatchError::InvalidConfig("no regions".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: no regions");
}

#[test]
fn test_rejection_display() {
    assert_eq!(format!("{}", Rejection::ShutDown), "region is shut down");
    assert_eq!(
        format!("{}", Rejection::AtCapacity { max: 2 }),
        "region at capacity (2 active jobs)"
    );
}
