//! Check that the all-flash system fills up and the simulation restarts.
use ckptsim::config::Configuration;
use ckptsim::simulation::{RunLimits, run};
use itertools::Itertools;
use serde::Deserialize;
use std::path::PathBuf;
use tempfile::tempdir;

#[derive(Debug, Deserialize)]
struct EventRow {
    time_ms: u64,
    event: String,
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckpointRow {
    time_ms: u64,
    trigger: u64,
}

#[test]
fn test_default_scenario_fills_after_seventeen_checkpoints() {
    let config = Configuration::from_path(PathBuf::from("demos/default")).unwrap();
    let dir = tempdir().unwrap();
    let limits = RunLimits {
        checkpoints: Some(20),
        duration: None,
        live: false,
        write_timeline: false,
        frame_interval_ms: 1000,
    };
    run(&config, dir.path(), &limits).unwrap();

    let events: Vec<EventRow> = csv::Reader::from_path(dir.path().join("events.csv"))
        .unwrap()
        .into_deserialize()
        .try_collect()
        .unwrap();
    let checkpoints: Vec<CheckpointRow> =
        csv::Reader::from_path(dir.path().join("checkpoints.csv"))
            .unwrap()
            .into_deserialize()
            .try_collect()
            .unwrap();

    let full = events
        .iter()
        .filter(|event| event.event == "capacity_full")
        .collect_vec();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].system.as_deref(), Some("all_flash"));

    // The 17th checkpoint fills the storage, then everything starts again from the first
    let triggers = checkpoints.iter().map(|row| row.trigger).collect_vec();
    assert_eq!(triggers[..17], (1..=17).collect_vec()[..]);
    assert_eq!(triggers[17..], [1, 2, 3]);
    let restart = events
        .iter()
        .find(|event| event.event == "restarted")
        .unwrap();
    assert!(restart.time_ms > full[0].time_ms);
    assert!(checkpoints[17].time_ms > restart.time_ms);
}
