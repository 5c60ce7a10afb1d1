//! Text rendering of the simulation state.
//!
//! Each frame shows the two systems side by side as fill bars with a status line, followed by the
//! metrics panel. Rendering is a pure function of a [`Snapshot`] and the configuration.
use crate::config::Configuration;
use crate::format::{format_currency, format_duration, format_large_number, format_number};
use crate::metrics::{CostSummary, Metrics};
use crate::scheduler::{Phase, SystemKind};
use crate::simulation::{Snapshot, SystemSnapshot};
use crate::timing::Timing;
use crate::units::{Seconds, Terabytes};
use std::fmt::{self, Display};

/// Width of a fill bar in characters
const BAR_WIDTH: usize = 40;

/// Status of a system's fast tier (or only tier)
pub fn status_label(system: &SystemSnapshot, running: bool) -> &'static str {
    if system.halted {
        return "Capacity Full";
    }

    match system.state.phase {
        Phase::Writing => "Writing Checkpoint",
        Phase::Migrating => "Migrating Data",
        Phase::Training => "Training",
        Phase::Idle if running => "Ready",
        Phase::Idle => "Standby",
    }
}

/// Status of the tiered system's HDD pool
pub fn slow_tier_status_label(system: &SystemSnapshot) -> &'static str {
    if system.state.phase == Phase::Migrating {
        "Receiving Data"
    } else {
        "Standby"
    }
}

/// Capacity in petabytes, for labels
fn petabytes(capacity: Terabytes) -> String {
    format_number(capacity.value() / 1000.0)
}

/// Label for the fast tier of a system, e.g. "SSD Layer · 8 Nodes · 1.47 PB · 23% Full"
pub fn fast_tier_label(kind: SystemKind, config: &Configuration, fill_percent: f64) -> String {
    let (name, capacity) = match kind {
        SystemKind::Tiered => ("SSD Layer", config.fast_tier_capacity()),
        SystemKind::AllFlash => ("All-Flash", config.competitor_capacity()),
    };

    format!(
        "{name} · {} Nodes · {} PB · {fill_percent:.0}% Full",
        config.storage_node_count,
        petabytes(capacity)
    )
}

/// Label for the tiered system's HDD pool, e.g. "HDD Pool · 7.02 PB · 1% Full"
pub fn slow_tier_label(config: &Configuration, fill_percent: f64) -> String {
    format!(
        "HDD Pool · {} PB · {fill_percent:.0}% Full",
        petabytes(config.slow_tier_capacity())
    )
}

/// A text bar filled in proportion to `fill_percent`
pub fn fill_bar(fill_percent: f64) -> String {
    let filled = ((fill_percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

fn write_system(
    f: &mut fmt::Formatter<'_>,
    system: &SystemSnapshot,
    running: bool,
    config: &Configuration,
) -> fmt::Result {
    let title = match system.kind {
        SystemKind::Tiered => "Tiered flash + HDD",
        SystemKind::AllFlash => "All-flash",
    };
    let state = &system.state;

    writeln!(f, "{title}: {}", status_label(system, running))?;
    writeln!(
        f,
        "  {} {}",
        fill_bar(state.fast_tier_fill_percent),
        fast_tier_label(system.kind, config, state.fast_tier_fill_percent)
    )?;
    if system.kind == SystemKind::Tiered {
        writeln!(
            f,
            "  {} {} ({})",
            fill_bar(state.slow_tier_fill_percent),
            slow_tier_label(config, state.slow_tier_fill_percent),
            slow_tier_status_label(system)
        )?;
        writeln!(
            f,
            "  {} of {} checkpoints retained in flash",
            system.retained_checkpoints, config.checkpoints_retained_in_flash
        )?;
    }

    Ok(())
}

/// The metrics panel, including the cost summary
pub struct MetricsPanel<'a> {
    /// The configuration the metrics were derived from
    pub config: &'a Configuration,
    /// The metrics to show
    pub metrics: &'a Metrics,
}

impl Display for MetricsPanel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (config, metrics) = (self.config, self.metrics);
        let costs = CostSummary::new(config, metrics);

        writeln!(f, "Performance metrics")?;
        writeln!(
            f,
            "  Checkpoint write time:    {} tiered vs {} all-flash ({}x faster)",
            format_duration(metrics.write_time_tiered),
            format_duration(metrics.write_time_competitor),
            format_number(metrics.speed_advantage().value())
        )?;
        writeln!(
            f,
            "  GPU-hours per checkpoint: {}",
            format_number(metrics.gpu_hours_per_checkpoint.value())
        )?;
        writeln!(
            f,
            "  GPU-hours gained:         {} ({} GPU-days) over {} checkpoints",
            format_large_number(metrics.cumulative_gpu_hours_gained.value()),
            format_number(metrics.gpu_days_gained()),
            metrics.total_checkpoints_completed
        )?;
        writeln!(
            f,
            "  Cost per TB:              ${} tiered vs ${} all-flash",
            format_number(metrics.tiered_cost_per_tb.value()),
            format_number(metrics.competitor_cost_per_tb.value())
        )?;
        writeln!(
            f,
            "  Hardware savings:         {} ({:.1}%)",
            format_currency(costs.hardware_savings),
            costs.hardware_savings_percent
        )?;
        writeln!(
            f,
            "  Annual compute savings:   {} ({} GPU-hours/yr @ {} min intervals)",
            format_currency(costs.annual_compute_savings),
            format_large_number(costs.annual_gpu_hours_gained.value()),
            config.checkpoint_interval_min
        )?;
        writeln!(
            f,
            "  Total annual savings:     {}",
            format_currency(costs.total_annual_savings)
        )
    }
}

/// One complete frame of the animation
pub struct Frame<'a> {
    /// The state to draw
    pub snapshot: &'a Snapshot,
    /// The configuration in use
    pub config: &'a Configuration,
    /// Timing for the configuration
    pub timing: &'a Timing,
}

impl Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (snapshot, config) = (self.snapshot, self.config);
        writeln!(
            f,
            "Checkpoint #{} · {} GPUs · {} TB checkpoints every {} min · {}x speed · {}",
            snapshot.trigger,
            format_number(config.gpu_count as f64),
            format_number(config.checkpoint_size.value()),
            config.checkpoint_interval_min,
            config.simulation_speed,
            if snapshot.running { "running" } else { "stopped" }
        )?;
        writeln!(
            f,
            "Elapsed: {} of animation ≈ {} minutes of training",
            format_duration(Seconds(snapshot.time as f64 / 1000.0)),
            format_number(self.timing.represented_minutes(snapshot.time))
        )?;

        for system in [&snapshot.tiered, &snapshot.all_flash] {
            writeln!(f)?;
            write_system(f, system, snapshot.running, config)?;
        }
        writeln!(f)?;
        write!(
            f,
            "{}",
            MetricsPanel {
                config,
                metrics: &snapshot.metrics
            }
        )
    }
}

/// Render a complete frame as text
pub fn render_frame(snapshot: &Snapshot, config: &Configuration, timing: &Timing) -> String {
    Frame {
        snapshot,
        config,
        timing,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{config, simulation};
    use crate::scheduler::RunState;
    use crate::simulation::Simulation;
    use rstest::rstest;

    fn system(kind: SystemKind, phase: Phase, halted: bool) -> SystemSnapshot {
        SystemSnapshot {
            kind,
            state: RunState {
                phase,
                ..RunState::default()
            },
            halted,
            retained_checkpoints: 0,
        }
    }

    #[rstest]
    #[case(Phase::Writing, true, false, "Writing Checkpoint")]
    #[case(Phase::Migrating, true, false, "Migrating Data")]
    #[case(Phase::Training, true, false, "Training")]
    #[case(Phase::Idle, true, false, "Ready")]
    #[case(Phase::Idle, false, false, "Standby")]
    #[case(Phase::Idle, true, true, "Capacity Full")]
    fn test_status_label(
        #[case] phase: Phase,
        #[case] running: bool,
        #[case] halted: bool,
        #[case] expected: &str,
    ) {
        let system = system(SystemKind::AllFlash, phase, halted);
        assert_eq!(status_label(&system, running), expected);
    }

    #[test]
    fn test_slow_tier_status_label() {
        let migrating = system(SystemKind::Tiered, Phase::Migrating, false);
        assert_eq!(slow_tier_status_label(&migrating), "Receiving Data");
        let writing = system(SystemKind::Tiered, Phase::Writing, false);
        assert_eq!(slow_tier_status_label(&writing), "Standby");
    }

    #[rstest]
    fn test_labels(config: Configuration) {
        assert_eq!(
            fast_tier_label(SystemKind::Tiered, &config, 23.4),
            "SSD Layer · 8 Nodes · 1.47 PB · 23% Full"
        );
        assert_eq!(
            fast_tier_label(SystemKind::AllFlash, &config, 98.0),
            "All-Flash · 8 Nodes · 1.47 PB · 98% Full"
        );
        assert_eq!(slow_tier_label(&config, 0.0), "HDD Pool · 7.02 PB · 0% Full");
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(50.0, 20)]
    #[case(100.0, 40)]
    #[case(150.0, 40)]
    fn test_fill_bar(#[case] fill_percent: f64, #[case] filled: usize) {
        let bar = fill_bar(fill_percent);
        assert_eq!(bar.chars().filter(|&c| c == '#').count(), filled);
        assert_eq!(bar.len(), BAR_WIDTH + 2);
    }

    #[rstest]
    fn test_render_metrics(config: Configuration) {
        let metrics = Metrics::derive(&config);
        let text = MetricsPanel {
            config: &config,
            metrics: &metrics,
        }
        .to_string();
        assert!(text.contains("4m 32s tiered vs 9m 4s all-flash (2x faster)"));
        assert!(text.contains("@ 30 min intervals"));
    }

    #[rstest]
    fn test_render_frame(mut simulation: Simulation) {
        simulation.start();
        simulation.advance_to(150_000);
        let frame = render_frame(
            &simulation.snapshot(),
            simulation.config(),
            simulation.timing(),
        );
        assert!(frame.starts_with("Checkpoint #1 · 1,024 GPUs"));
        assert!(frame.contains("All-flash: Writing Checkpoint"));
        assert!(frame.contains("HDD Pool"));
    }
}
