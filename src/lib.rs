//! Common functionality for ckptsim, an animated comparison of tiered and all-flash storage for
//! GPU checkpoint writes.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod format;
pub mod input;
pub mod log;
pub mod metrics;
pub mod output;
pub mod scheduler;
pub mod settings;
pub mod simulation;
pub mod timer;
pub mod timing;
pub mod units;
pub mod view;

#[cfg(test)]
mod fixture;

/// Get the directory where the program's config files are stored.
///
/// Falls back on the current working directory if the platform has no config directory.
pub fn get_ckptsim_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        return PathBuf::new();
    };

    config_dir.push("ckptsim");
    config_dir
}
