//! Code for writing metadata to file
use crate::config::Configuration;
use crate::timing::Timing;
use anyhow::Result;
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get information about program version from git
fn get_git_hash() -> String {
    let Some(hash) = built_info::GIT_COMMIT_HASH_SHORT else {
        return "unknown".into();
    };

    if built_info::GIT_DIRTY == Some(true) {
        format!("{hash}-dirty")
    } else {
        hash.into()
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    scenario: &'a Configuration,
    timing: &'a Timing,
    program: ProgramMetadata<'a>,
    platform: PlatformMetadata,
}

/// Information about the run
#[derive(Serialize)]
struct RunMetadata<'a> {
    /// Path to the scenario which was run
    scenario_path: &'a Path,
    /// The date and time on which the run started
    datetime: String,
}

impl<'a> RunMetadata<'a> {
    fn new(scenario_path: &'a Path) -> Self {
        Self {
            scenario_path,
            datetime: Local::now().to_rfc2822(),
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata<'a> {
    /// The program name
    name: &'a str,
    /// The program version as specified in Cargo.toml
    version: &'a str,
    /// The target architecture for the build (e.g. x86_64-unknown-linux-gnu)
    target: &'a str,
    /// Whether it is a debug build
    is_debug: bool,
    /// The version of rustc used to compile the program
    rustc_version: &'a str,
    /// When the program was built
    build_time_utc: &'a str,
    /// The git commit hash for this version (if known)
    git_commit_hash: String,
}

impl Default for ProgramMetadata<'_> {
    fn default() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash: get_git_hash(),
        }
    }
}

/// Information about the platform we are running on.
///
/// The fields correspond to different data available from the [`PlatformInfo`] struct.
#[derive(Serialize, Default)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    /// Query the platform, leaving fields empty if this fails
    fn new() -> Self {
        let Ok(info) = PlatformInfo::new() else {
            return Self::default();
        };

        Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        }
    }
}

/// Write metadata to the specified output path in TOML format
pub fn write_metadata(
    output_path: &Path,
    scenario_path: &Path,
    config: &Configuration,
    timing: &Timing,
) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata::new(scenario_path),
        scenario: config,
        timing,
        program: ProgramMetadata::default(),
        platform: PlatformMetadata::new(),
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{config, timing};
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_write_metadata(config: Configuration, timing: Timing) {
        let dir = tempdir().unwrap();
        write_metadata(dir.path(), Path::new("demos/default"), &config, &timing).unwrap();

        let contents = fs::read_to_string(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let value: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(
            value["scenario"]["gpu_count"].as_integer(),
            Some(i64::from(config.gpu_count))
        );
        assert_eq!(
            value["timing"]["trigger_period_ms"].as_integer(),
            Some(120_000)
        );
        assert_eq!(
            value["program"]["name"].as_str(),
            Some(built_info::PKG_NAME)
        );
    }
}
