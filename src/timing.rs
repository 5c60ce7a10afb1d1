//! Animation timing derived from the configuration and metrics.
//!
//! All durations are in milliseconds of animation time. At 1× speed the slower system's write
//! takes [`BASE_WRITE_MS`], the faster one proportionally less, and the shared checkpoint
//! trigger fires once per full cycle.
use crate::config::Configuration;
use crate::metrics::Metrics;
use serde::Serialize;

/// Milliseconds of animation time
pub type Millis = u64;

/// Animation time for the slower system's checkpoint write at 1× speed
pub const BASE_WRITE_MS: Millis = 60_000;

/// Pause between phases at 1× speed
pub const BASE_PAUSE_MS: Millis = 15_000;

/// Duration of a migration from fast to slow tier at 1× speed
pub const BASE_MIGRATION_MS: Millis = 30_000;

/// Phase durations and the trigger period for one configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timing {
    /// Write phase of the tiered system
    pub tiered_write_ms: Millis,
    /// Write phase of the all-flash system
    pub competitor_write_ms: Millis,
    /// Each pause between phases
    pub pause_ms: Millis,
    /// Migration phase of the tiered system
    pub migration_ms: Millis,
    /// Training phase of the all-flash system
    pub training_ms: Millis,
    /// Period of the shared checkpoint trigger
    pub trigger_period_ms: Millis,
    /// Ratio of real-world checkpoint interval to the unscaled animation cycle
    pub auto_speedup: f64,
    /// Simulation speed multiplier
    pub speed: u32,
}

/// Scale a 1× duration by the speed multiplier, never going below one millisecond
fn scale(duration: Millis, speed: u32) -> Millis {
    (duration / Millis::from(speed.max(1))).max(1)
}

impl Timing {
    /// Derive the timing for `config`, using the write times in `metrics`
    pub fn new(config: &Configuration, metrics: &Metrics) -> Self {
        let tiered = metrics.write_time_tiered.value();
        let competitor = metrics.write_time_competitor.value();
        let slowest = tiered.max(competitor);

        // The slower system's write defines the base; the other is proportionally shorter
        let base_write = |time: f64| {
            if slowest > 0.0 {
                (BASE_WRITE_MS as f64 * time / slowest).round() as Millis
            } else {
                BASE_WRITE_MS
            }
        };
        let base_tiered_write = base_write(tiered);
        let base_competitor_write = base_write(competitor);

        let base_write_max = base_tiered_write.max(base_competitor_write);
        let base_cycle = base_write_max + BASE_PAUSE_MS + BASE_MIGRATION_MS + BASE_PAUSE_MS;
        let speed = config.simulation_speed;

        Self {
            tiered_write_ms: scale(base_tiered_write, speed),
            competitor_write_ms: scale(base_competitor_write, speed),
            pause_ms: scale(BASE_PAUSE_MS, speed),
            migration_ms: scale(BASE_MIGRATION_MS, speed),
            // Training fills the rest of the all-flash system's cycle
            training_ms: scale(
                base_cycle - base_competitor_write - BASE_PAUSE_MS,
                speed,
            ),
            trigger_period_ms: base_cycle.div_ceil(Millis::from(speed.max(1))),
            auto_speedup: config.checkpoint_interval_ms() as f64 / base_cycle as f64,
            speed,
        }
    }

    /// Total factor by which real-world time is compressed in the animation
    pub fn compression(&self) -> f64 {
        self.auto_speedup * f64::from(self.speed)
    }

    /// The real-world time represented by `animation_ms` of animation, in minutes
    pub fn represented_minutes(&self, animation_ms: Millis) -> f64 {
        animation_ms as f64 * self.compression() / 60_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::config;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_timing_default(config: Configuration) {
        let timing = Timing::new(&config, &Metrics::derive(&config));
        assert_eq!(timing.competitor_write_ms, 60_000);
        assert_eq!(timing.tiered_write_ms, 30_000);
        assert_eq!(timing.pause_ms, 15_000);
        assert_eq!(timing.migration_ms, 30_000);
        assert_eq!(timing.training_ms, 45_000);
        assert_eq!(timing.trigger_period_ms, 120_000);
        assert_approx_eq!(f64, timing.auto_speedup, 15.0);
    }

    #[rstest]
    #[case(1, 120_000)]
    #[case(2, 60_000)]
    #[case(5, 24_000)]
    #[case(10, 12_000)]
    #[case(100, 1_200)]
    fn test_trigger_period_scales_with_speed(
        config: Configuration,
        #[case] speed: u32,
        #[case] expected: Millis,
    ) {
        let config = Configuration {
            simulation_speed: speed,
            ..config
        };
        let timing = Timing::new(&config, &Metrics::derive(&config));
        assert_eq!(timing.trigger_period_ms, expected);
    }

    #[rstest]
    fn test_cycles_fit_in_trigger_period(config: Configuration) {
        for speed in [1, 2, 5, 10, 100] {
            let config = Configuration {
                simulation_speed: speed,
                ..config.clone()
            };
            let timing = Timing::new(&config, &Metrics::derive(&config));
            let tiered = timing.tiered_write_ms
                + timing.pause_ms
                + timing.migration_ms
                + timing.pause_ms;
            let competitor = timing.competitor_write_ms + timing.pause_ms + timing.training_ms;
            assert!(tiered <= timing.trigger_period_ms);
            assert!(competitor <= timing.trigger_period_ms);
        }
    }

    #[rstest]
    fn test_represented_time(config: Configuration) {
        // One trigger period stands for one real-world checkpoint interval
        let timing = Timing::new(&config, &Metrics::derive(&config));
        assert_approx_eq!(
            f64,
            timing.represented_minutes(timing.trigger_period_ms),
            30.0,
            epsilon = 1e-9
        );
    }

    #[rstest]
    #[case(15)]
    #[case(120)]
    fn test_interval_changes_represented_time_only(config: Configuration, #[case] interval: u32) {
        let config = Configuration {
            checkpoint_interval_min: interval,
            ..config
        };
        let timing = Timing::new(&config, &Metrics::derive(&config));
        assert_eq!(timing.trigger_period_ms, 120_000);
        assert_approx_eq!(
            f64,
            timing.represented_minutes(timing.trigger_period_ms),
            f64::from(interval),
            epsilon = 1e-9
        );
    }
}
