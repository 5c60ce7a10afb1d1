//! Fixtures for tests

use crate::config::Configuration;
use crate::metrics::Metrics;
use crate::scheduler::{PhaseScheduler, StorageProfile};
use crate::simulation::Simulation;
use crate::timing::Timing;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn config() -> Configuration {
    Configuration::default()
}

#[fixture]
pub fn timing(config: Configuration) -> Timing {
    Timing::new(&config, &Metrics::derive(&config))
}

#[fixture]
pub fn tiered_scheduler(config: Configuration, timing: Timing) -> PhaseScheduler {
    PhaseScheduler::new(StorageProfile::tiered(&config, &timing))
}

#[fixture]
pub fn all_flash_scheduler(config: Configuration, timing: Timing) -> PhaseScheduler {
    PhaseScheduler::new(StorageProfile::all_flash(&config, &timing))
}

#[fixture]
pub fn simulation(config: Configuration) -> Simulation {
    Simulation::new(config)
}
