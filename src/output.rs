//! The module responsible for writing output data to disk.
use crate::scheduler::{Phase, SystemKind};
use crate::simulation::{SimulationEvent, Snapshot, SystemSnapshot};
use crate::timing::Millis;
use crate::view::status_label;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which scenario-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "ckptsim_results";

/// The output file name for checkpoints
const CHECKPOINTS_FILE_NAME: &str = "checkpoints.csv";

/// The output file name for events
const EVENTS_FILE_NAME: &str = "events.csv";

/// The output file name for the per-frame timeline
const TIMELINE_FILE_NAME: &str = "timeline.csv";

/// Get the output directory for the specified scenario directory
pub fn get_output_dir(scenario_dir: &Path) -> Result<PathBuf> {
    // canonicalise in case the user has specified "."
    let scenario_dir = scenario_dir
        .canonicalize()
        .context("Could not resolve path to scenario")?;

    let scenario_name = scenario_dir
        .file_name()
        .context("Scenario cannot be in root folder")?
        .to_str()
        .context("Invalid chars in scenario dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, scenario_name].iter().collect())
}

/// Create a new output directory, optionally replacing an existing one.
///
/// # Returns
///
/// Whether an existing, non-empty directory was overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let is_non_empty = output_dir.is_dir()
        && fs::read_dir(output_dir)
            .with_context(|| format!("Could not read {}", output_dir.display()))?
            .next()
            .is_some();
    if is_non_empty {
        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(is_non_empty)
}

/// Represents a row in the checkpoints CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CheckpointRow {
    time_ms: Millis,
    trigger: u64,
    total_checkpoints_completed: u64,
    cumulative_gpu_hours_gained: f64,
}

/// Represents a row in the events CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct EventRow {
    time_ms: Millis,
    event: String,
    system: Option<String>,
    detail: Option<String>,
}

impl EventRow {
    fn new(time_ms: Millis, event: &str) -> Self {
        Self {
            time_ms,
            event: event.into(),
            system: None,
            detail: None,
        }
    }

    fn with_system(self, system: SystemKind, detail: String) -> Self {
        Self {
            system: Some(system.to_string()),
            detail: Some(detail),
            ..self
        }
    }
}

/// Represents a row in the timeline CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TimelineRow {
    time_ms: Millis,
    trigger: u64,
    system: String,
    phase: Phase,
    status: String,
    fast_tier_fill_percent: f64,
    slow_tier_fill_percent: f64,
    is_active: bool,
}

impl TimelineRow {
    fn new(snapshot: &Snapshot, system: &SystemSnapshot) -> Self {
        Self {
            time_ms: snapshot.time,
            trigger: snapshot.trigger,
            system: system.kind.to_string(),
            phase: system.state.phase,
            status: status_label(system, snapshot.running).into(),
            fast_tier_fill_percent: system.state.fast_tier_fill_percent,
            slow_tier_fill_percent: system.state.slow_tier_fill_percent,
            is_active: system.state.is_active,
        }
    }
}

/// An object for writing simulation results to file
pub struct DataWriter {
    checkpoints_writer: csv::Writer<File>,
    events_writer: csv::Writer<File>,
    timeline_writer: Option<csv::Writer<File>>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `write_timeline` - Whether to record the state of both systems at every frame
    pub fn create(output_path: &Path, write_timeline: bool) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        let timeline_writer = if write_timeline {
            Some(new_writer(TIMELINE_FILE_NAME)?)
        } else {
            None
        };

        Ok(Self {
            checkpoints_writer: new_writer(CHECKPOINTS_FILE_NAME)?,
            events_writer: new_writer(EVENTS_FILE_NAME)?,
            timeline_writer,
        })
    }

    /// Write events to file.
    ///
    /// Checkpoints go to the checkpoints file; everything else goes to the events file.
    pub fn write_events(&mut self, events: &[SimulationEvent]) -> Result<()> {
        for event in events {
            let row = match *event {
                SimulationEvent::Checkpoint {
                    time,
                    trigger,
                    total_checkpoints_completed,
                    cumulative_gpu_hours_gained,
                } => {
                    self.checkpoints_writer.serialize(CheckpointRow {
                        time_ms: time,
                        trigger,
                        total_checkpoints_completed,
                        cumulative_gpu_hours_gained: cumulative_gpu_hours_gained.value(),
                    })?;
                    continue;
                }
                SimulationEvent::Started { time } => EventRow::new(time, "started"),
                SimulationEvent::Stopped { time } => EventRow::new(time, "stopped"),
                SimulationEvent::ConfigApplied { time } => EventRow::new(time, "config_applied"),
                SimulationEvent::Restarted { time } => EventRow::new(time, "restarted"),
                SimulationEvent::PhaseChanged {
                    time,
                    system,
                    phase,
                } => EventRow::new(time, "phase_changed").with_system(system, phase.to_string()),
                SimulationEvent::CapacityFull {
                    time,
                    system,
                    fill_percent,
                } => EventRow::new(time, "capacity_full")
                    .with_system(system, format!("{fill_percent:.2}")),
            };
            self.events_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Record the state of both systems, if the timeline is enabled
    pub fn write_frame(&mut self, snapshot: &Snapshot) -> Result<()> {
        if let Some(wtr) = &mut self.timeline_writer {
            for system in [&snapshot.tiered, &snapshot.all_flash] {
                wtr.serialize(TimelineRow::new(snapshot, system))?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.checkpoints_writer.flush()?;
        self.events_writer.flush()?;
        if let Some(wtr) = &mut self.timeline_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::simulation;
    use crate::simulation::Simulation;
    use crate::units::Hours;
    use itertools::{Itertools, assert_equal};
    use rstest::rstest;
    use std::iter;
    use tempfile::tempdir;

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results");

        // New directory
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());

        // Empty directory can be reused
        assert!(!create_output_directory(&output_dir, false).unwrap());

        // Non-empty directory needs permission
        fs::write(output_dir.join("file.txt"), "data").unwrap();
        assert!(create_output_directory(&output_dir, false).is_err());
        assert!(create_output_directory(&output_dir, true).unwrap());
        assert!(!output_dir.join("file.txt").exists());
    }

    #[test]
    fn test_write_checkpoints() {
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path(), false).unwrap();
            writer
                .write_events(&[SimulationEvent::Checkpoint {
                    time: 120_000,
                    trigger: 1,
                    total_checkpoints_completed: 1,
                    cumulative_gpu_hours_gained: Hours(77.0),
                }])
                .unwrap();
            writer.flush().unwrap();
        }

        let expected = CheckpointRow {
            time_ms: 120_000,
            trigger: 1,
            total_checkpoints_completed: 1,
            cumulative_gpu_hours_gained: 77.0,
        };
        let records: Vec<CheckpointRow> =
            csv::Reader::from_path(dir.path().join(CHECKPOINTS_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        assert_equal(records, iter::once(expected));
    }

    #[test]
    fn test_write_events() {
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path(), false).unwrap();
            writer
                .write_events(&[
                    SimulationEvent::Started { time: 0 },
                    SimulationEvent::PhaseChanged {
                        time: 10,
                        system: SystemKind::AllFlash,
                        phase: Phase::Writing,
                    },
                ])
                .unwrap();
            writer.flush().unwrap();
        }

        let records: Vec<EventRow> = csv::Reader::from_path(dir.path().join(EVENTS_FILE_NAME))
            .unwrap()
            .into_deserialize()
            .try_collect()
            .unwrap();
        assert_equal(
            records,
            [
                EventRow::new(0, "started"),
                EventRow {
                    time_ms: 10,
                    event: "phase_changed".into(),
                    system: Some("all_flash".into()),
                    detail: Some("writing".into()),
                },
            ],
        );
    }

    #[rstest]
    fn test_write_frame(mut simulation: Simulation) {
        let dir = tempdir().unwrap();
        simulation.start();
        simulation.advance_to(150_000);
        {
            let mut writer = DataWriter::create(dir.path(), true).unwrap();
            writer.write_frame(&simulation.snapshot()).unwrap();
            writer.flush().unwrap();
        }

        let records: Vec<TimelineRow> =
            csv::Reader::from_path(dir.path().join(TIMELINE_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].system, "tiered");
        assert_eq!(records[1].system, "all_flash");
        assert_eq!(records[1].phase, Phase::Writing);
        assert_eq!(records[1].status, "Writing Checkpoint");
    }

    #[test]
    fn test_no_timeline_by_default() {
        let dir = tempdir().unwrap();
        DataWriter::create(dir.path(), false).unwrap();
        assert!(!dir.path().join(TIMELINE_FILE_NAME).exists());
    }
}
