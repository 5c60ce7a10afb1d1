//! Derivation of the displayed metrics from the configuration.
//!
//! [`Metrics`] is recomputed from scratch whenever the configuration changes and updated
//! incrementally each time the shared checkpoint trigger fires. [`CostSummary`] is a pure function
//! of the configuration and the current metrics.
use crate::config::Configuration;
use crate::units::{Dimensionless, Hours, Money, MoneyPerHour, MoneyPerTerabyte, Seconds};
use serde::Serialize;

/// Price of enterprise flash
pub const SSD_COST_PER_TB: MoneyPerTerabyte = MoneyPerTerabyte(150.0);

/// Price of enterprise HDD capacity
pub const HDD_COST_PER_TB: MoneyPerTerabyte = MoneyPerTerabyte(18.0);

/// Typical cloud price of one GPU-hour
pub const GPU_COST_PER_HOUR: MoneyPerHour = MoneyPerHour(2.0);

/// Number of minutes in a (non-leap) year
const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Snapshot of the derived performance metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Metrics {
    /// Time for the tiered system to absorb one checkpoint
    pub write_time_tiered: Seconds,
    /// Time for the all-flash system to absorb one checkpoint
    pub write_time_competitor: Seconds,
    /// GPU-hours of training time freed per checkpoint by the faster write
    pub gpu_hours_per_checkpoint: Hours,
    /// GPU-hours gained over all checkpoints since the last reset
    pub cumulative_gpu_hours_gained: Hours,
    /// Number of checkpoints since the last reset
    pub total_checkpoints_completed: u64,
    /// Blended hardware cost per TB of the tiered system
    pub tiered_cost_per_tb: MoneyPerTerabyte,
    /// Hardware cost per TB of the all-flash system
    pub competitor_cost_per_tb: MoneyPerTerabyte,
}

impl Metrics {
    /// Derive metrics for `config`, with no checkpoints accumulated yet
    pub fn derive(config: &Configuration) -> Self {
        let checkpoint_size = config.checkpoint_size.to_gigabytes();
        let write_time_tiered = checkpoint_size / config.tiered_bandwidth();
        let write_time_competitor = checkpoint_size / config.competitor_bandwidth();
        let time_saved = (write_time_competitor - write_time_tiered).to_hours();

        Self {
            write_time_tiered,
            write_time_competitor,
            gpu_hours_per_checkpoint: time_saved * Dimensionless(config.gpu_count as f64),
            cumulative_gpu_hours_gained: Hours(0.0),
            total_checkpoints_completed: 0,
            tiered_cost_per_tb: tiered_cost_per_tb(config),
            competitor_cost_per_tb: SSD_COST_PER_TB,
        }
    }

    /// Account for one more checkpoint
    pub fn record_checkpoint(&mut self) {
        self.cumulative_gpu_hours_gained =
            self.cumulative_gpu_hours_gained + self.gpu_hours_per_checkpoint;
        self.total_checkpoints_completed += 1;
    }

    /// How many times faster the tiered system writes a checkpoint
    pub fn speed_advantage(&self) -> Dimensionless {
        if self.write_time_tiered.value() <= 0.0 {
            return Dimensionless(1.0);
        }

        self.write_time_competitor / self.write_time_tiered
    }

    /// Cumulative GPU time gained, expressed in GPU-days
    pub fn gpu_days_gained(&self) -> f64 {
        self.cumulative_gpu_hours_gained.value() / 24.0
    }
}

/// Blended hardware cost per TB of the tiered system's flash and HDD tiers
fn tiered_cost_per_tb(config: &Configuration) -> MoneyPerTerabyte {
    let fast = config.fast_tier_capacity();
    let slow = config.slow_tier_capacity();
    let total_cost = SSD_COST_PER_TB * fast + HDD_COST_PER_TB * slow;

    total_cost / (fast + slow)
}

/// Hardware and compute-time savings of the tiered system
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostSummary {
    /// Hardware cost of the tiered system
    pub tiered_hardware_cost: Money,
    /// Cost of holding the same total capacity on flash only
    pub all_flash_equivalent_cost: Money,
    /// Difference between the two hardware costs
    pub hardware_savings: Money,
    /// Hardware savings as a percentage of the all-flash cost
    pub hardware_savings_percent: f64,
    /// GPU-hours gained per year at the configured checkpoint interval
    pub annual_gpu_hours_gained: Hours,
    /// Value of the annual GPU-hours gained
    pub annual_compute_savings: Money,
    /// Hardware plus compute savings
    pub total_annual_savings: Money,
}

impl CostSummary {
    /// Calculate the cost summary for the given configuration and metrics
    pub fn new(config: &Configuration, metrics: &Metrics) -> Self {
        let fast = config.fast_tier_capacity();
        let slow = config.slow_tier_capacity();
        let tiered_hardware_cost = SSD_COST_PER_TB * fast + HDD_COST_PER_TB * slow;
        let all_flash_equivalent_cost = SSD_COST_PER_TB * (fast + slow);
        let hardware_savings = all_flash_equivalent_cost - tiered_hardware_cost;

        let checkpoints_per_year = MINUTES_PER_YEAR / config.checkpoint_interval_min as f64;
        let annual_gpu_hours_gained =
            metrics.gpu_hours_per_checkpoint * Dimensionless(checkpoints_per_year);
        let annual_compute_savings = GPU_COST_PER_HOUR * annual_gpu_hours_gained;

        Self {
            tiered_hardware_cost,
            all_flash_equivalent_cost,
            hardware_savings,
            hardware_savings_percent: (hardware_savings / all_flash_equivalent_cost).0 * 100.0,
            annual_gpu_hours_gained,
            annual_compute_savings,
            total_annual_savings: hardware_savings + annual_compute_savings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::config;
    use crate::units::{GigabytesPerSecond, Terabytes};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_derive_reference_scenario(config: Configuration) {
        // 8 nodes at 40 vs 20 GB/s per node
        let metrics = Metrics::derive(&config);
        assert_approx_eq!(f64, metrics.write_time_tiered.value(), 272.0);
        assert_approx_eq!(f64, metrics.write_time_competitor.value(), 544.0);
        assert_approx_eq!(
            f64,
            metrics.gpu_hours_per_checkpoint.value(),
            272.0 / 3600.0 * 1024.0,
            epsilon = 1e-9
        );
        assert_eq!(metrics.total_checkpoints_completed, 0);
        assert_eq!(metrics.cumulative_gpu_hours_gained, Hours(0.0));
    }

    #[rstest]
    fn test_derive_fixed_bandwidth(config: Configuration) {
        // A single node gives the aggregate 40 vs 20 GB/s of the earliest demo
        let config = Configuration {
            storage_node_count: 1,
            ..config
        };
        let metrics = Metrics::derive(&config);
        assert_approx_eq!(f64, metrics.write_time_tiered.value(), 2176.0);
        assert_approx_eq!(f64, metrics.write_time_competitor.value(), 4352.0);
        assert_approx_eq!(
            f64,
            metrics.gpu_hours_per_checkpoint.value(),
            618.951_111,
            epsilon = 1e-3
        );
        assert_approx_eq!(f64, metrics.speed_advantage().value(), 2.0);
    }

    #[rstest]
    #[case(40.0, 20.0)]
    #[case(25.0, 24.0)]
    #[case(1000.0, 1.0)]
    fn test_faster_bandwidth_writes_faster(
        config: Configuration,
        #[case] tiered: f64,
        #[case] competitor: f64,
    ) {
        for size in [0.5, 10.0, 85.0, 1000.0] {
            let config = Configuration {
                checkpoint_size: Terabytes(size),
                tiered_node_bandwidth: GigabytesPerSecond(tiered),
                competitor_node_bandwidth: GigabytesPerSecond(competitor),
                ..config.clone()
            };
            let metrics = Metrics::derive(&config);
            assert!(metrics.write_time_tiered < metrics.write_time_competitor);
            assert!(metrics.gpu_hours_per_checkpoint > Hours(0.0));
        }
    }

    #[rstest]
    fn test_record_checkpoint(config: Configuration) {
        let mut metrics = Metrics::derive(&config);
        metrics.record_checkpoint();
        metrics.record_checkpoint();
        assert_eq!(metrics.total_checkpoints_completed, 2);
        assert_approx_eq!(
            f64,
            metrics.cumulative_gpu_hours_gained.value(),
            2.0 * metrics.gpu_hours_per_checkpoint.value()
        );

        // Rederiving clears the accumulated values
        assert_eq!(Metrics::derive(&config).total_checkpoints_completed, 0);
    }

    #[rstest]
    fn test_cost_per_tb(config: Configuration) {
        let metrics = Metrics::derive(&config);
        let expected = (1474.56 * 150.0 + 7020.0 * 18.0) / (1474.56 + 7020.0);
        assert_approx_eq!(
            f64,
            metrics.tiered_cost_per_tb.value(),
            expected,
            epsilon = 1e-9
        );
        assert_eq!(metrics.competitor_cost_per_tb, SSD_COST_PER_TB);
        assert!(metrics.tiered_cost_per_tb < metrics.competitor_cost_per_tb);
    }

    #[rstest]
    fn test_cost_summary(config: Configuration) {
        let metrics = Metrics::derive(&config);
        let summary = CostSummary::new(&config, &metrics);

        // Only the HDD tier differs in price: 7020 TB at $132/TB less
        assert_approx_eq!(
            f64,
            summary.hardware_savings.value(),
            7020.0 * 132.0,
            epsilon = 1e-6
        );
        assert_approx_eq!(
            f64,
            summary.annual_gpu_hours_gained.value(),
            17520.0 * metrics.gpu_hours_per_checkpoint.value(),
            epsilon = 1e-6
        );
        assert_approx_eq!(
            f64,
            summary.total_annual_savings.value(),
            summary.hardware_savings.value() + summary.annual_compute_savings.value(),
            epsilon = 1e-6
        );
        assert!(summary.hardware_savings_percent > 0.0 && summary.hardware_savings_percent < 100.0);
    }
}
