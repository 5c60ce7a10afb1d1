//! Functionality for running the side-by-side simulation.
//!
//! A [`Simulation`] owns the shared checkpoint trigger and both [`PhaseScheduler`]s. Everything
//! happens on a virtual clock measured in milliseconds of animation time, which only moves when
//! [`Simulation::advance_to`] is called.
use crate::config::Configuration;
use crate::metrics::Metrics;
use crate::output::DataWriter;
use crate::scheduler::{
    Phase, PhaseScheduler, RunState, SchedulerSignal, StorageProfile, SystemKind,
};
use crate::timer::{TimerId, TimerQueue};
use crate::timing::{Millis, Timing};
use crate::units::Hours;
use crate::view;
use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Timers owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlEvent {
    /// The shared checkpoint trigger
    CheckpointTick,
    /// Restart after storage filled up
    AutoRestart,
}

/// Something observable which happened during the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    /// The simulation was started
    Started {
        /// Virtual time
        time: Millis,
    },
    /// The simulation was stopped and in-flight cycles were cancelled
    Stopped {
        /// Virtual time
        time: Millis,
    },
    /// A new configuration was applied
    ConfigApplied {
        /// Virtual time
        time: Millis,
    },
    /// The shared trigger fired
    Checkpoint {
        /// Virtual time
        time: Millis,
        /// The new trigger value
        trigger: u64,
        /// Checkpoints since the last reset
        total_checkpoints_completed: u64,
        /// GPU-hours gained since the last reset
        cumulative_gpu_hours_gained: Hours,
    },
    /// One of the systems entered a new phase
    PhaseChanged {
        /// Virtual time
        time: Millis,
        /// The system concerned
        system: SystemKind,
        /// The new phase
        phase: Phase,
    },
    /// One of the systems filled up
    CapacityFull {
        /// Virtual time
        time: Millis,
        /// The system concerned
        system: SystemKind,
        /// Fill level which triggered the halt
        fill_percent: f64,
    },
    /// Everything was reset after storage filled up
    Restarted {
        /// Virtual time
        time: Millis,
    },
}

impl SimulationEvent {
    /// When the event happened
    pub fn time(&self) -> Millis {
        match *self {
            Self::Started { time }
            | Self::Stopped { time }
            | Self::ConfigApplied { time }
            | Self::Checkpoint { time, .. }
            | Self::PhaseChanged { time, .. }
            | Self::CapacityFull { time, .. }
            | Self::Restarted { time } => time,
        }
    }
}

/// The state of one system at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemSnapshot {
    /// Which system
    pub kind: SystemKind,
    /// Phase and fill levels
    pub state: RunState,
    /// Whether the system has stopped because it is full
    pub halted: bool,
    /// Checkpoints held in the fast tier
    pub retained_checkpoints: u32,
}

impl SystemSnapshot {
    fn new(scheduler: &PhaseScheduler) -> Self {
        Self {
            kind: scheduler.kind(),
            state: *scheduler.state(),
            halted: scheduler.is_halted(),
            retained_checkpoints: scheduler.retained_checkpoints(),
        }
    }
}

/// Everything the presentation layer needs to draw one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    /// Virtual time
    pub time: Millis,
    /// Current value of the shared trigger
    pub trigger: u64,
    /// Whether the simulation is running
    pub running: bool,
    /// The tiered system
    pub tiered: SystemSnapshot,
    /// The all-flash system
    pub all_flash: SystemSnapshot,
    /// Current metrics
    pub metrics: Metrics,
}

/// Controller for the two storage systems and the shared checkpoint trigger
#[derive(Debug)]
pub struct Simulation {
    config: Configuration,
    timing: Timing,
    metrics: Metrics,
    trigger: u64,
    running: bool,
    now: Millis,
    timers: TimerQueue<ControlEvent>,
    tick_timer: Option<TimerId>,
    tiered: PhaseScheduler,
    all_flash: PhaseScheduler,
    restarts: u32,
    /// Events raised by control calls, reported by the next call to `advance_to`
    pending: Vec<SimulationEvent>,
}

/// Clamp `config` to the permitted bounds, warning about anything which had to change
fn clamp_config(config: &Configuration) -> Configuration {
    let (config, adjustments) = config.clamped();
    for adjustment in adjustments {
        warn!("Configuration value out of range, adjusted {adjustment}");
    }

    config
}

impl Simulation {
    /// Create a stopped simulation for `config`.
    ///
    /// Out-of-range values are clamped to the nearest permitted value.
    pub fn new(config: Configuration) -> Self {
        let config = clamp_config(&config);
        let metrics = Metrics::derive(&config);
        let timing = Timing::new(&config, &metrics);

        Self {
            tiered: PhaseScheduler::new(StorageProfile::tiered(&config, &timing)),
            all_flash: PhaseScheduler::new(StorageProfile::all_flash(&config, &timing)),
            config,
            timing,
            metrics,
            trigger: 0,
            running: false,
            now: 0,
            timers: TimerQueue::new(),
            tick_timer: None,
            restarts: 0,
            pending: Vec::new(),
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The current metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Phase durations for the current configuration
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Current virtual time
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Current value of the shared trigger
    pub fn trigger(&self) -> u64 {
        self.trigger
    }

    /// Whether the simulation is running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// How many times the simulation has restarted because storage filled up
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// The scheduler for the given system
    pub fn scheduler(&self, kind: SystemKind) -> &PhaseScheduler {
        match kind {
            SystemKind::Tiered => &self.tiered,
            SystemKind::AllFlash => &self.all_flash,
        }
    }

    fn scheduler_mut(&mut self, kind: SystemKind) -> &mut PhaseScheduler {
        match kind {
            SystemKind::Tiered => &mut self.tiered,
            SystemKind::AllFlash => &mut self.all_flash,
        }
    }

    /// Current state of everything, for drawing
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.now,
            trigger: self.trigger,
            running: self.running,
            tiered: SystemSnapshot::new(&self.tiered),
            all_flash: SystemSnapshot::new(&self.all_flash),
            metrics: self.metrics,
        }
    }

    /// Start the shared trigger.
    ///
    /// If storage filled up while the simulation was stopped, everything is reset first.
    pub fn start(&mut self) {
        if self.running {
            return;
        }

        info!("Starting simulation at {} ms", self.now);
        self.running = true;
        self.pending.push(SimulationEvent::Started { time: self.now });
        if self.tiered.is_halted() || self.all_flash.is_halted() {
            self.reset();
        } else {
            self.schedule_tick();
        }
    }

    /// Stop the shared trigger and cancel any cycles in progress
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        info!("Stopping simulation at {} ms", self.now);
        self.running = false;
        self.cancel_pending();
        self.pending.push(SimulationEvent::Stopped { time: self.now });
    }

    /// Start if stopped, stop if running
    pub fn toggle(&mut self) {
        if self.running {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Restore the initial demo configuration and start from scratch
    pub fn reset_to_initial_state(&mut self) {
        self.apply_config(&Configuration::default());
        self.start();
    }

    /// Apply a configuration edit.
    ///
    /// The simulation is paused, reset and resumed (if it was running) with the new values, which
    /// are clamped to their permitted ranges.
    pub fn apply_config(&mut self, config: &Configuration) {
        let was_running = self.running;
        self.running = false;
        self.cancel_pending();

        self.config = clamp_config(config);
        self.metrics = Metrics::derive(&self.config);
        self.timing = Timing::new(&self.config, &self.metrics);
        self.tiered
            .reconfigure(StorageProfile::tiered(&self.config, &self.timing));
        self.all_flash
            .reconfigure(StorageProfile::all_flash(&self.config, &self.timing));
        info!(
            "Applied new configuration: trigger period {} ms",
            self.timing.trigger_period_ms
        );
        self.pending
            .push(SimulationEvent::ConfigApplied { time: self.now });

        self.reset();
        self.running = was_running;
        if was_running {
            self.schedule_tick();
        }
    }

    /// Zero the trigger, both run states and the accumulated metrics.
    ///
    /// If running, the next tick is scheduled one trigger period from now.
    fn reset(&mut self) {
        self.cancel_pending();
        self.trigger = 0;
        self.tiered.reset();
        self.all_flash.reset();
        self.metrics = Metrics::derive(&self.config);
        if self.running {
            self.schedule_tick();
        }
    }

    /// Invalidate every pending timer and cycle
    fn cancel_pending(&mut self) {
        self.timers.cancel_all();
        self.tick_timer = None;
        self.tiered.cancel();
        self.all_flash.cancel();
    }

    fn schedule_tick(&mut self) {
        let time = self.now + self.timing.trigger_period_ms;
        self.tick_timer = Some(self.timers.schedule(time, ControlEvent::CheckpointTick));
    }

    /// When the next scheduler deadline or timer is due
    fn next_due(&mut self) -> Option<Millis> {
        [
            self.tiered.next_deadline(),
            self.all_flash.next_deadline(),
            self.timers.peek_time(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Move the virtual clock forward to `target`, processing everything due on the way.
    ///
    /// Scheduler deadlines are processed before timers due at the same instant.
    ///
    /// # Returns
    ///
    /// The events which happened, in the order they happened.
    pub fn advance_to(&mut self, target: Millis) -> Vec<SimulationEvent> {
        let target = target.max(self.now);
        while let Some(time) = self.next_due().filter(|&time| time <= target) {
            self.now = time;
            self.advance_schedulers(time);
            if let Some(timer) = self.timers.pop_due(time) {
                self.handle_control_event(timer.data);
            }
        }

        self.now = target;
        self.advance_schedulers(target);

        std::mem::take(&mut self.pending)
    }

    /// Move the virtual clock forward by `duration`
    pub fn advance_by(&mut self, duration: Millis) -> Vec<SimulationEvent> {
        self.advance_to(self.now + duration)
    }

    fn advance_schedulers(&mut self, now: Millis) {
        let mut signals = self.tiered.advance(now);
        signals.extend(self.all_flash.advance(now));
        self.handle_signals(signals);
    }

    fn handle_control_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::CheckpointTick => self.on_tick(),
            ControlEvent::AutoRestart => {
                self.restarts += 1;
                info!("Restarting simulation after storage filled up");
                self.reset();
                self.pending
                    .push(SimulationEvent::Restarted { time: self.now });
            }
        }
    }

    /// Increment the shared trigger and start a cycle in both systems
    fn on_tick(&mut self) {
        self.trigger += 1;
        self.metrics.record_checkpoint();
        info!("Checkpoint {} at {} ms", self.trigger, self.now);
        self.pending.push(SimulationEvent::Checkpoint {
            time: self.now,
            trigger: self.trigger,
            total_checkpoints_completed: self.metrics.total_checkpoints_completed,
            cumulative_gpu_hours_gained: self.metrics.cumulative_gpu_hours_gained,
        });
        self.schedule_tick();

        let (trigger, now) = (self.trigger, self.now);
        let mut signals = self.tiered.on_checkpoint(trigger, now);
        signals.extend(self.all_flash.on_checkpoint(trigger, now));
        self.handle_signals(signals);
    }

    fn handle_signals(&mut self, signals: Vec<SchedulerSignal>) {
        for signal in signals {
            match signal {
                SchedulerSignal::PhaseChanged {
                    system,
                    phase,
                    time,
                } => self.pending.push(SimulationEvent::PhaseChanged {
                    time,
                    system,
                    phase,
                }),
                SchedulerSignal::CapacityFull {
                    system,
                    fill_percent,
                    time,
                } => {
                    self.pending.push(SimulationEvent::CapacityFull {
                        time,
                        system,
                        fill_percent,
                    });
                    self.on_capacity_full(system);
                }
            }
        }
    }

    /// Stop the trigger and arrange a restart, if one isn't already pending
    fn on_capacity_full(&mut self, system: SystemKind) {
        let Some(tick) = self.tick_timer.take() else {
            debug!("{system}: trigger already stopped");
            return;
        };
        self.timers.cancel(tick);

        if self.config.auto_restart {
            let delay = Millis::from(self.config.restart_delay_s) * 1000;
            info!("{system} storage is full, restarting in {delay} ms");
            self.timers
                .schedule(self.now + delay, ControlEvent::AutoRestart);
        } else {
            info!("{system} storage is full, stopping simulation");
            self.running = false;
            let other = match system {
                SystemKind::Tiered => SystemKind::AllFlash,
                SystemKind::AllFlash => SystemKind::Tiered,
            };
            self.scheduler_mut(other).cancel();
        }
    }
}

/// When a headless or live run should finish
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunLimits {
    /// Stop after this many checkpoints (counting across restarts)
    pub checkpoints: Option<u64>,
    /// Stop after this much animation time
    pub duration: Option<Millis>,
    /// Pace the run against the wall clock and draw each frame
    pub live: bool,
    /// Record the state of both systems at every frame
    pub write_timeline: bool,
    /// Animation time between frames
    pub frame_interval_ms: Millis,
}

impl RunLimits {
    fn is_reached(&self, checkpoints: u64, now: Millis) -> bool {
        self.checkpoints.is_some_and(|limit| checkpoints >= limit)
            || self.duration.is_some_and(|limit| now >= limit)
    }
}

/// Run the simulation, writing results to `output_path`.
///
/// # Arguments
///
/// * `config` - The scenario to run
/// * `output_path` - The folder to which output files will be written
/// * `limits` - When to stop and how to present the run
pub fn run(config: &Configuration, output_path: &Path, limits: &RunLimits) -> Result<()> {
    let mut writer = DataWriter::create(output_path, limits.write_timeline)?;
    let mut simulation = Simulation::new(config.clone());
    let frame_interval = limits.frame_interval_ms.max(1);
    let mut checkpoints = 0;

    simulation.start();
    loop {
        let events = simulation.advance_by(frame_interval);
        checkpoints += events
            .iter()
            .filter(|event| matches!(event, SimulationEvent::Checkpoint { .. }))
            .count() as u64;
        writer.write_events(&events)?;

        let snapshot = simulation.snapshot();
        writer.write_frame(&snapshot)?;
        if limits.live {
            let frame = view::render_frame(&snapshot, simulation.config(), simulation.timing());
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "\x1b[2J\x1b[H{frame}")?;
            stdout.flush()?;
            thread::sleep(Duration::from_millis(frame_interval));
        }

        if limits.is_reached(checkpoints, simulation.now()) {
            break;
        }

        // Storage filled up without auto-restart, so nothing else will happen
        if !simulation.is_running() {
            info!(
                "Simulation stopped at {} ms because storage is full",
                simulation.now()
            );
            break;
        }
    }
    writer.flush()?;

    info!(
        "Finished after {checkpoints} checkpoints and {} restarts ({} ms of animation)",
        simulation.restarts(),
        simulation.now()
    );

    Ok(())
}
