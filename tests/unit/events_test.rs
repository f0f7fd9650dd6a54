//! Tests for event sinks

use prometheus_dispatch::core::{build_job_event, EventSink, InMemoryEventSink, StdoutEventSink};

#[test]
fn test_in_memory_event_sink() {
    let sink = InMemoryEventSink::new(10);
    let mut writer = sink.clone();

    writer.record(build_job_event(1, Some("Barbara"), Some("Alex"), "picking up rider"));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].job_id, 1);
    assert_eq!(events[0].worker.as_deref(), Some("Barbara"));
    assert_eq!(sink.lines(), vec!["1:Barbara:Alex: picking up rider".to_string()]);
}

#[test]
fn test_missing_names_render_null() {
    let event = build_job_event(9, None, Some("Alex"), "awaiting worker");
    assert_eq!(event.to_string(), "9:null:Alex: awaiting worker");
}

#[test]
fn test_stdout_sink_accepts_events() {
    let mut sink = StdoutEventSink;
    sink.record(build_job_event(1, None, None, "smoke"));
}
