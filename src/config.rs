//! Defines the `Configuration` struct, which represents the contents of `scenario.toml`.
//!
//! A configuration loaded from file is validated strictly, whereas edits made while a simulation
//! is running are clamped to the permitted range (see [`Configuration::clamped`]).
use crate::input::{Bounds, check_within_bounds, input_err_msg, read_toml};
use crate::units::{Dimensionless, GigabytesPerSecond, Petabytes, Terabytes};
use anyhow::{Context, Result, ensure};
use float_cmp::approx_eq;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The name of the scenario file inside a scenario directory
pub const SCENARIO_FILE_NAME: &str = "scenario.toml";

/// Number of SSDs in every storage node, for both systems
pub const SSDS_PER_NODE: u32 = 12;

/// The permitted simulation speed multipliers
pub const SIMULATION_SPEEDS: [u32; 5] = [1, 2, 5, 10, 100];

/// The permitted per-drive SSD capacities in TB
pub const SSD_CAPACITY_OPTIONS: [f64; 5] = [3.84, 7.68, 15.36, 30.72, 61.44];

const GPU_COUNT_BOUNDS: Bounds = Bounds::new(1.0, 65536.0);
const CHECKPOINT_SIZE_BOUNDS: Bounds = Bounds::with_step(0.5, 1000.0, 0.5);
const CHECKPOINT_INTERVAL_BOUNDS: Bounds = Bounds::with_step(15.0, 120.0, 5.0);
const STORAGE_NODE_BOUNDS: Bounds = Bounds::new(5.0, 20.0);
// Any value in range: the initial 7.02 PB pool is off the 0.5 PB grid
const HDD_POOL_SIZE_BOUNDS: Bounds = Bounds::new(3.0, 50.0);
const CHECKPOINTS_IN_FLASH_BOUNDS: Bounds = Bounds::new(1.0, 10.0);
const NODE_BANDWIDTH_BOUNDS: Bounds = Bounds::new(1.0, 1000.0);
const RESTART_DELAY_BOUNDS: Bounds = Bounds::new(0.0, 600.0);

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_gpu_count, u32, 1024);
define_unit_param_default!(default_checkpoint_size, Terabytes, 85.0);
define_param_default!(default_checkpoint_interval_min, u32, 30);
define_param_default!(default_simulation_speed, u32, 1);
define_param_default!(default_storage_node_count, u32, 8);
define_unit_param_default!(default_ssd_capacity, Terabytes, 15.36);
define_unit_param_default!(default_hdd_pool_size, Petabytes, 7.02);
define_param_default!(default_checkpoints_retained_in_flash, u32, 3);
define_unit_param_default!(default_tiered_node_bandwidth, GigabytesPerSecond, 40.0);
define_unit_param_default!(default_competitor_node_bandwidth, GigabytesPerSecond, 20.0);
define_param_default!(default_auto_restart, bool, true);
define_param_default!(default_restart_delay_s, u32, 5);

/// User-editable parameters of the comparison.
///
/// All fields are optional in the scenario file; missing fields take the values of the initial
/// demo state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Number of GPUs in the training cluster
    #[serde(default = "default_gpu_count")]
    pub gpu_count: u32,
    /// Size of one checkpoint
    #[serde(default = "default_checkpoint_size", rename = "checkpoint_size_tb")]
    pub checkpoint_size: Terabytes,
    /// Real-world time between checkpoints in minutes
    #[serde(default = "default_checkpoint_interval_min")]
    pub checkpoint_interval_min: u32,
    /// Animation speed multiplier
    #[serde(default = "default_simulation_speed")]
    pub simulation_speed: u32,
    /// Number of storage nodes, shared by both systems
    #[serde(default = "default_storage_node_count")]
    pub storage_node_count: u32,
    /// Capacity of each SSD in the tiered system
    #[serde(default = "default_ssd_capacity", rename = "tiered_ssd_capacity_tb")]
    pub tiered_ssd_capacity: Terabytes,
    /// Capacity of each SSD in the all-flash system
    #[serde(default = "default_ssd_capacity", rename = "competitor_ssd_capacity_tb")]
    pub competitor_ssd_capacity: Terabytes,
    /// Size of the tiered system's HDD pool
    #[serde(default = "default_hdd_pool_size", rename = "hdd_pool_size_pb")]
    pub hdd_pool_size: Petabytes,
    /// How many checkpoints the tiered system keeps in flash before migrating the oldest
    #[serde(default = "default_checkpoints_retained_in_flash")]
    pub checkpoints_retained_in_flash: u32,
    /// Write bandwidth of one tiered storage node
    #[serde(
        default = "default_tiered_node_bandwidth",
        rename = "tiered_node_bandwidth_gbs"
    )]
    pub tiered_node_bandwidth: GigabytesPerSecond,
    /// Write bandwidth of one all-flash storage node
    #[serde(
        default = "default_competitor_node_bandwidth",
        rename = "competitor_node_bandwidth_gbs"
    )]
    pub competitor_node_bandwidth: GigabytesPerSecond,
    /// Whether to restart the simulation automatically once storage is full
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,
    /// Animation time to wait before an automatic restart, in seconds
    #[serde(default = "default_restart_delay_s")]
    pub restart_delay_s: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            gpu_count: default_gpu_count(),
            checkpoint_size: default_checkpoint_size(),
            checkpoint_interval_min: default_checkpoint_interval_min(),
            simulation_speed: default_simulation_speed(),
            storage_node_count: default_storage_node_count(),
            tiered_ssd_capacity: default_ssd_capacity(),
            competitor_ssd_capacity: default_ssd_capacity(),
            hdd_pool_size: default_hdd_pool_size(),
            checkpoints_retained_in_flash: default_checkpoints_retained_in_flash(),
            tiered_node_bandwidth: default_tiered_node_bandwidth(),
            competitor_node_bandwidth: default_competitor_node_bandwidth(),
            auto_restart: default_auto_restart(),
            restart_delay_s: default_restart_delay_s(),
        }
    }
}

/// Check that the `simulation_speed` parameter is one of the permitted multipliers
fn check_simulation_speed(speed: u32) -> Result<()> {
    ensure!(
        SIMULATION_SPEEDS.contains(&speed),
        "`simulation_speed` must be one of {}, got {speed}",
        SIMULATION_SPEEDS.iter().join(", ")
    );

    Ok(())
}

/// Check that an SSD capacity is one of the available drive sizes
fn check_ssd_capacity(field: &str, capacity: Terabytes) -> Result<()> {
    ensure!(
        SSD_CAPACITY_OPTIONS
            .iter()
            .any(|option| approx_eq!(f64, capacity.value(), *option, epsilon = 1e-9)),
        "`{field}` must be one of {}, got {capacity}",
        SSD_CAPACITY_OPTIONS.iter().join(", ")
    );

    Ok(())
}

/// Snap a value to the closest member of `options`
fn nearest_option<T: Copy>(value: f64, options: &[T], to_f64: impl Fn(T) -> f64) -> T {
    let mut best = options[0];
    for &option in options {
        if (to_f64(option) - value).abs() < (to_f64(best) - value).abs() {
            best = option;
        }
    }

    best
}

impl Configuration {
    /// Read the scenario file from the specified directory.
    ///
    /// If the directory has no scenario file, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `scenario_dir` - Folder containing the scenario file
    pub fn from_path<P: AsRef<Path>>(scenario_dir: P) -> Result<Configuration> {
        let file_path = scenario_dir.as_ref().join(SCENARIO_FILE_NAME);
        let config: Configuration = read_toml(&file_path)?;

        config
            .validate()
            .with_context(|| input_err_msg(&file_path))?;

        Ok(config)
    }

    /// Check that every field is within its permitted range
    pub fn validate(&self) -> Result<()> {
        check_within_bounds("gpu_count", self.gpu_count as f64, &GPU_COUNT_BOUNDS)?;
        check_within_bounds(
            "checkpoint_size_tb",
            self.checkpoint_size.value(),
            &CHECKPOINT_SIZE_BOUNDS,
        )?;
        check_within_bounds(
            "checkpoint_interval_min",
            self.checkpoint_interval_min as f64,
            &CHECKPOINT_INTERVAL_BOUNDS,
        )?;
        check_simulation_speed(self.simulation_speed)?;
        check_within_bounds(
            "storage_node_count",
            self.storage_node_count as f64,
            &STORAGE_NODE_BOUNDS,
        )?;
        check_ssd_capacity("tiered_ssd_capacity_tb", self.tiered_ssd_capacity)?;
        check_ssd_capacity("competitor_ssd_capacity_tb", self.competitor_ssd_capacity)?;
        check_within_bounds(
            "hdd_pool_size_pb",
            self.hdd_pool_size.value(),
            &HDD_POOL_SIZE_BOUNDS,
        )?;
        check_within_bounds(
            "checkpoints_retained_in_flash",
            self.checkpoints_retained_in_flash as f64,
            &CHECKPOINTS_IN_FLASH_BOUNDS,
        )?;
        check_within_bounds(
            "tiered_node_bandwidth_gbs",
            self.tiered_node_bandwidth.value(),
            &NODE_BANDWIDTH_BOUNDS,
        )?;
        check_within_bounds(
            "competitor_node_bandwidth_gbs",
            self.competitor_node_bandwidth.value(),
            &NODE_BANDWIDTH_BOUNDS,
        )?;
        check_within_bounds(
            "restart_delay_s",
            self.restart_delay_s as f64,
            &RESTART_DELAY_BOUNDS,
        )?;

        Ok(())
    }

    /// Clamp every field to its permitted range.
    ///
    /// # Returns
    ///
    /// The clamped configuration along with a description of each field which had to change.
    pub fn clamped(&self) -> (Configuration, Vec<String>) {
        let mut adjustments = Vec::new();
        let mut clamp = |field: &str, value: f64, bounds: &Bounds| {
            let new_value = bounds.clamp(value);
            if !approx_eq!(f64, new_value, value, epsilon = 1e-9) {
                adjustments.push(format!("{field}: {value} -> {new_value}"));
            }
            new_value
        };

        let mut clamped = Configuration {
            gpu_count: clamp("gpu_count", self.gpu_count as f64, &GPU_COUNT_BOUNDS) as u32,
            checkpoint_size: Terabytes(clamp(
                "checkpoint_size_tb",
                self.checkpoint_size.value(),
                &CHECKPOINT_SIZE_BOUNDS,
            )),
            checkpoint_interval_min: clamp(
                "checkpoint_interval_min",
                self.checkpoint_interval_min as f64,
                &CHECKPOINT_INTERVAL_BOUNDS,
            ) as u32,
            simulation_speed: self.simulation_speed,
            storage_node_count: clamp(
                "storage_node_count",
                self.storage_node_count as f64,
                &STORAGE_NODE_BOUNDS,
            ) as u32,
            tiered_ssd_capacity: self.tiered_ssd_capacity,
            competitor_ssd_capacity: self.competitor_ssd_capacity,
            hdd_pool_size: Petabytes(clamp(
                "hdd_pool_size_pb",
                self.hdd_pool_size.value(),
                &HDD_POOL_SIZE_BOUNDS,
            )),
            checkpoints_retained_in_flash: clamp(
                "checkpoints_retained_in_flash",
                self.checkpoints_retained_in_flash as f64,
                &CHECKPOINTS_IN_FLASH_BOUNDS,
            ) as u32,
            tiered_node_bandwidth: GigabytesPerSecond(clamp(
                "tiered_node_bandwidth_gbs",
                self.tiered_node_bandwidth.value(),
                &NODE_BANDWIDTH_BOUNDS,
            )),
            competitor_node_bandwidth: GigabytesPerSecond(clamp(
                "competitor_node_bandwidth_gbs",
                self.competitor_node_bandwidth.value(),
                &NODE_BANDWIDTH_BOUNDS,
            )),
            auto_restart: self.auto_restart,
            restart_delay_s: clamp(
                "restart_delay_s",
                self.restart_delay_s as f64,
                &RESTART_DELAY_BOUNDS,
            ) as u32,
        };

        // Options from a fixed list are snapped to the closest choice
        let speed = nearest_option(self.simulation_speed as f64, &SIMULATION_SPEEDS, f64::from);
        if speed != self.simulation_speed {
            adjustments.push(format!(
                "simulation_speed: {} -> {speed}",
                self.simulation_speed
            ));
            clamped.simulation_speed = speed;
        }
        for (field, capacity) in [
            ("tiered_ssd_capacity_tb", &mut clamped.tiered_ssd_capacity),
            (
                "competitor_ssd_capacity_tb",
                &mut clamped.competitor_ssd_capacity,
            ),
        ] {
            let option = nearest_option(capacity.value(), &SSD_CAPACITY_OPTIONS, |o| o);
            if !approx_eq!(f64, option, capacity.value(), epsilon = 1e-9) {
                adjustments.push(format!("{field}: {capacity} -> {option}"));
                *capacity = Terabytes(option);
            }
        }

        (clamped, adjustments)
    }

    /// Total flash capacity of the tiered system
    pub fn fast_tier_capacity(&self) -> Terabytes {
        Dimensionless((self.storage_node_count * SSDS_PER_NODE) as f64) * self.tiered_ssd_capacity
    }

    /// Capacity of the tiered system's HDD pool
    pub fn slow_tier_capacity(&self) -> Terabytes {
        self.hdd_pool_size.to_terabytes()
    }

    /// Total flash capacity of the all-flash system
    pub fn competitor_capacity(&self) -> Terabytes {
        Dimensionless((self.storage_node_count * SSDS_PER_NODE) as f64)
            * self.competitor_ssd_capacity
    }

    /// Aggregate write bandwidth of the tiered system's flash tier
    pub fn tiered_bandwidth(&self) -> GigabytesPerSecond {
        Dimensionless(self.storage_node_count as f64) * self.tiered_node_bandwidth
    }

    /// Aggregate write bandwidth of the all-flash system
    pub fn competitor_bandwidth(&self) -> GigabytesPerSecond {
        Dimensionless(self.storage_node_count as f64) * self.competitor_node_bandwidth
    }

    /// The real-world checkpoint interval in milliseconds
    pub fn checkpoint_interval_ms(&self) -> u64 {
        u64::from(self.checkpoint_interval_min) * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, config};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn test_from_path_defaults() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join(SCENARIO_FILE_NAME)).unwrap();

        assert_eq!(
            Configuration::from_path(dir.path()).unwrap(),
            Configuration::default()
        );
    }

    #[test]
    fn test_from_path() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(SCENARIO_FILE_NAME)).unwrap();
            writeln!(file, "gpu_count = 512\ncheckpoint_size_tb = 42.5").unwrap();
        }

        let config = Configuration::from_path(dir.path()).unwrap();
        assert_eq!(config.gpu_count, 512);
        assert_eq!(config.checkpoint_size, Terabytes(42.5));
        assert_eq!(config.storage_node_count, 8);
    }

    #[test]
    fn test_from_path_invalid() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(SCENARIO_FILE_NAME)).unwrap();
            writeln!(file, "storage_node_count = 3").unwrap();
        }

        let err = Configuration::from_path(dir.path()).unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "`storage_node_count` must be between 5 and 20, got 3"
        );
    }

    #[test]
    fn test_from_path_unknown_field() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(SCENARIO_FILE_NAME)).unwrap();
            writeln!(file, "gpus = 4").unwrap();
        }

        assert!(Configuration::from_path(dir.path()).is_err());
    }

    #[rstest]
    #[case(1, true)]
    #[case(100, true)]
    #[case(0, false)]
    #[case(3, false)]
    #[case(1000, false)]
    fn test_check_simulation_speed(#[case] speed: u32, #[case] valid: bool) {
        assert_eq!(check_simulation_speed(speed).is_ok(), valid);
    }

    #[test]
    fn test_check_ssd_capacity() {
        assert!(check_ssd_capacity("tiered_ssd_capacity_tb", Terabytes(30.72)).is_ok());
        assert_error!(
            check_ssd_capacity("tiered_ssd_capacity_tb", Terabytes(10.0)),
            "`tiered_ssd_capacity_tb` must be one of 3.84, 7.68, 15.36, 30.72, 61.44, got 10"
        );
    }

    #[rstest]
    fn test_clamped_unchanged(config: Configuration) {
        let (clamped, adjustments) = config.clamped();
        assert_eq!(clamped, config);
        assert!(adjustments.is_empty());
    }

    #[rstest]
    fn test_clamped(config: Configuration) {
        let config = Configuration {
            storage_node_count: 2,
            checkpoint_interval_min: 33,
            simulation_speed: 7,
            competitor_ssd_capacity: Terabytes(16.0),
            ..config
        };

        let (clamped, adjustments) = config.clamped();
        assert_eq!(clamped.storage_node_count, 5);
        assert_eq!(clamped.checkpoint_interval_min, 35);
        assert_eq!(clamped.simulation_speed, 5);
        assert_eq!(clamped.competitor_ssd_capacity, Terabytes(15.36));
        assert_eq!(adjustments.len(), 4);
        clamped.validate().unwrap();
    }

    #[rstest]
    fn test_capacities(config: Configuration) {
        assert_approx_eq!(
            f64,
            config.fast_tier_capacity().value(),
            1474.56,
            epsilon = 1e-9
        );
        assert_approx_eq!(
            f64,
            config.competitor_capacity().value(),
            1474.56,
            epsilon = 1e-9
        );
        assert_approx_eq!(
            f64,
            config.slow_tier_capacity().value(),
            7020.0,
            epsilon = 1e-9
        );
        assert_eq!(config.tiered_bandwidth(), GigabytesPerSecond(320.0));
        assert_eq!(config.competitor_bandwidth(), GigabytesPerSecond(160.0));
        assert_eq!(config.checkpoint_interval_ms(), 1_800_000);
    }
}
