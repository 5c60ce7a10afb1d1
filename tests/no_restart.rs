//! Check that a run ends once storage fills up if auto-restart is disabled.
use ckptsim::config::Configuration;
use ckptsim::simulation::{RunLimits, run};
use itertools::Itertools;
use serde::Deserialize;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[derive(Debug, Deserialize)]
struct EventRow {
    time_ms: u64,
    event: String,
}

#[derive(Debug, Deserialize)]
struct TimelineRow {
    time_ms: u64,
    status: String,
}

#[test]
fn test_run_ends_when_storage_fills_without_restart() {
    let config = Configuration {
        auto_restart: false,
        ..Configuration::default()
    };
    let dir = tempdir().unwrap();
    let output_path = dir.path().to_path_buf();
    let limits = RunLimits {
        checkpoints: Some(20),
        duration: None,
        live: false,
        write_timeline: true,
        frame_interval_ms: 1000,
    };

    // Run on another thread so that the test fails rather than hangs if the run never ends
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || sender.send(run(&config, &output_path, &limits).is_ok()));
    assert!(receiver.recv_timeout(Duration::from_secs(60)).unwrap());

    let events: Vec<EventRow> = csv::Reader::from_path(dir.path().join("events.csv"))
        .unwrap()
        .into_deserialize()
        .try_collect()
        .unwrap();
    let full = events
        .iter()
        .filter(|event| event.event == "capacity_full")
        .collect_vec();
    assert_eq!(full.len(), 1);
    assert!(!events.iter().any(|event| event.event == "restarted"));

    // Only the checkpoints before the storage filled up happened
    let checkpoints = std::fs::read_to_string(dir.path().join("checkpoints.csv")).unwrap();
    assert_eq!(checkpoints.lines().count(), 1 + 17);

    // The last frame shows the full system and comes straight after it filled up
    let timeline: Vec<TimelineRow> = csv::Reader::from_path(dir.path().join("timeline.csv"))
        .unwrap()
        .into_deserialize()
        .try_collect()
        .unwrap();
    let last = timeline.last().unwrap();
    assert!(last.time_ms < full[0].time_ms + 1000);
    assert!(timeline.iter().any(|row| row.status == "Capacity Full"));
}
