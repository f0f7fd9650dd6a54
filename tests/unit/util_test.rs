//! Tests for utility functions

use prometheus_dispatch::util::{init_tracing, now_ms};

#[test]
fn test_now_ms_advances() {
    let before = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_init_tracing_with_after_install_is_refused() {
    init_tracing();
    assert!(!prometheus_dispatch::util::init_tracing_with("prometheus_dispatch=debug"));
}
