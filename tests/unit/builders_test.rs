//! Tests for builder modules

use std::time::Duration;

use prometheus_dispatch::builders::DispatcherBuilder;
use prometheus_dispatch::config::{DispatchConfig, OverflowPolicy};
use prometheus_dispatch::core::{InMemoryEventSink, Worker};

#[test]
fn test_builder_from_config() {
    let config = DispatchConfig::from_json_str(r#"{ "regions": { "North": { "max_simultaneous_jobs": 2 } } }"#)
        .unwrap();
    let dispatcher = DispatcherBuilder::from_config(config).build().unwrap();

    let north = dispatcher.region("North").unwrap();
    assert_eq!(north.max_simultaneous_jobs(), 2);
    assert_eq!(dispatcher.pool().capacity(), 999);
    assert_eq!(dispatcher.pool().overflow_policy(), OverflowPolicy::Reject);
}

#[test]
fn test_builder_from_json_file() {
    let path = std::env::temp_dir().join(format!("dispatch-builder-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{ "regions": { "South": { "max_simultaneous_jobs": 1 } }, "log_events": true }"#,
    )
    .unwrap();

    let builder = DispatcherBuilder::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(builder.config().log_events);

    let sink = InMemoryEventSink::new(16);
    let dispatcher = builder.event_sink(sink.clone()).build().unwrap();
    assert!(dispatcher.add_worker(Worker::new("Barbara", Duration::ZERO)));
    assert_eq!(dispatcher.idle_workers(), 1);
}

#[test]
fn test_builder_worker_capacity() {
    let dispatcher = DispatcherBuilder::new()
        .region("North", 1)
        .worker_capacity(1)
        .build()
        .unwrap();
    assert!(dispatcher.add_worker(Worker::new("a", Duration::ZERO)));
    assert!(!dispatcher.add_worker(Worker::new("b", Duration::ZERO)));
}
