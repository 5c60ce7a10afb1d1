//! The phase scheduler which animates one storage system's checkpoint cycles.
//!
//! Each system runs the same [`PhaseScheduler`], configured by a [`StorageProfile`] describing its
//! capacities and its sequence of steps. A cycle is started by [`PhaseScheduler::on_checkpoint`]
//! and moved along by [`PhaseScheduler::advance`], which completes every step whose deadline has
//! passed and interpolates the fill levels of the step in progress.
//!
//! The scheduler holds at most one pending deadline. Cancelling drops it and bumps the
//! scheduler's generation, so nothing from an abandoned cycle can touch the run state afterwards.
use crate::config::Configuration;
use crate::timing::{Millis, Timing};
use crate::units::Terabytes;
use log::{debug, info};
use serde::Serialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use strum::{Display, EnumIter};

/// Fill level at which storage is considered full
pub const FULL_THRESHOLD_PERCENT: f64 = 95.0;

/// The two storage systems being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    /// Flash fast tier backed by an HDD slow tier
    #[strum(serialize = "tiered")]
    Tiered,
    /// Flash only
    #[strum(serialize = "all_flash")]
    AllFlash,
}

/// The phase a system is in, as shown to the user
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum Phase {
    /// Waiting for the next checkpoint, or pausing between steps
    #[default]
    #[string = "idle"]
    Idle,
    /// Absorbing a checkpoint from the GPU cluster
    #[string = "writing"]
    Writing,
    /// Moving the oldest checkpoint from the fast to the slow tier
    #[string = "migrating"]
    Migrating,
    /// GPUs are training; no data movement
    #[string = "training"]
    Training,
}

/// One kind of step in a checkpoint cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write one checkpoint into the fast tier
    Write,
    /// Do nothing for a while
    Pause,
    /// Move one checkpoint to the slow tier, if more than the retained number are in flash.
    ///
    /// If no migration is needed, the cycle ends here.
    Migrate,
    /// Training phase with no data movement
    Train,
}

impl Step {
    /// The phase shown while this step is in progress
    fn phase(self) -> Phase {
        match self {
            Self::Write => Phase::Writing,
            Self::Pause => Phase::Idle,
            Self::Migrate => Phase::Migrating,
            Self::Train => Phase::Training,
        }
    }
}

/// A step along with how long it lasts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedStep {
    /// What happens during the step
    pub step: Step,
    /// Duration in animation time
    pub duration: Millis,
}

/// Capacities and step plan for one storage system
#[derive(Debug, Clone, PartialEq)]
pub struct StorageProfile {
    /// Which system this describes
    pub kind: SystemKind,
    /// Size of one checkpoint
    pub checkpoint_size: Terabytes,
    /// Capacity of the tier which absorbs checkpoint writes
    pub fast_tier_capacity: Terabytes,
    /// Capacity of the tier receiving migrated checkpoints, if there is one
    pub slow_tier_capacity: Option<Terabytes>,
    /// Number of checkpoints kept in the fast tier before migrating
    pub checkpoints_retained: u32,
    /// The steps of one checkpoint cycle
    pub plan: Vec<PlannedStep>,
}

impl StorageProfile {
    /// Profile of the tiered system: write, pause, then migrate and pause if needed
    pub fn tiered(config: &Configuration, timing: &Timing) -> Self {
        Self {
            kind: SystemKind::Tiered,
            checkpoint_size: config.checkpoint_size,
            fast_tier_capacity: config.fast_tier_capacity(),
            slow_tier_capacity: Some(config.slow_tier_capacity()),
            checkpoints_retained: config.checkpoints_retained_in_flash,
            plan: vec![
                PlannedStep {
                    step: Step::Write,
                    duration: timing.tiered_write_ms,
                },
                PlannedStep {
                    step: Step::Pause,
                    duration: timing.pause_ms,
                },
                PlannedStep {
                    step: Step::Migrate,
                    duration: timing.migration_ms,
                },
                PlannedStep {
                    step: Step::Pause,
                    duration: timing.pause_ms,
                },
            ],
        }
    }

    /// Profile of the all-flash system: write, pause, then train
    pub fn all_flash(config: &Configuration, timing: &Timing) -> Self {
        Self {
            kind: SystemKind::AllFlash,
            checkpoint_size: config.checkpoint_size,
            fast_tier_capacity: config.competitor_capacity(),
            slow_tier_capacity: None,
            checkpoints_retained: 0,
            plan: vec![
                PlannedStep {
                    step: Step::Write,
                    duration: timing.competitor_write_ms,
                },
                PlannedStep {
                    step: Step::Pause,
                    duration: timing.pause_ms,
                },
                PlannedStep {
                    step: Step::Train,
                    duration: timing.training_ms,
                },
            ],
        }
    }

    /// The fill level at which this system counts as full, if it has reached it
    fn full_level(&self, levels: &Levels) -> Option<f64> {
        let fast = fill_percent(levels.fast, self.fast_tier_capacity);
        let level = match self.slow_tier_capacity {
            Some(slow_capacity) => fast.max(fill_percent(
                levels.fast + levels.slow,
                self.fast_tier_capacity + slow_capacity,
            )),
            None => fast,
        };

        (level >= FULL_THRESHOLD_PERCENT).then_some(level)
    }
}

/// Percentage of `capacity` used by `used`, clamped to [0, 100]
fn fill_percent(used: Terabytes, capacity: Terabytes) -> f64 {
    if capacity.value() <= 0.0 {
        return if used.value() > 0.0 { 100.0 } else { 0.0 };
    }

    ((used / capacity).0 * 100.0).clamp(0.0, 100.0)
}

/// Data held by each tier
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Levels {
    fast: Terabytes,
    slow: Terabytes,
    /// Checkpoints held in the fast tier
    retained: u32,
}

/// The observable state of one system
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RunState {
    /// Current phase
    pub phase: Phase,
    /// Fast tier fill level, in percent
    pub fast_tier_fill_percent: f64,
    /// Slow tier fill level, in percent (always zero for systems without one)
    pub slow_tier_fill_percent: f64,
    /// Whether a checkpoint cycle is in progress
    pub is_active: bool,
    /// The trigger value which started the current or most recent cycle
    pub cycle: u64,
}

/// Notable things which happened while advancing a scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerSignal {
    /// The system entered a new phase
    PhaseChanged {
        /// The system concerned
        system: SystemKind,
        /// The new phase
        phase: Phase,
        /// When the phase changed
        time: Millis,
    },
    /// Storage has reached the full threshold and the scheduler has halted
    CapacityFull {
        /// The system concerned
        system: SystemKind,
        /// The fill level which triggered the halt
        fill_percent: f64,
        /// When the storage became full
        time: Millis,
    },
}

/// The step currently in progress
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveStep {
    index: usize,
    started_at: Millis,
    deadline: Millis,
    from: Levels,
    to: Levels,
}

/// Timer-driven state machine for one storage system
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    profile: StorageProfile,
    state: RunState,
    /// Levels as of the end of the last completed step
    levels: Levels,
    active: Option<ActiveStep>,
    generation: u64,
    halted: bool,
}

impl PhaseScheduler {
    /// Create an idle scheduler with empty storage
    pub fn new(profile: StorageProfile) -> Self {
        Self {
            profile,
            state: RunState::default(),
            levels: Levels::default(),
            active: None,
            generation: 0,
            halted: false,
        }
    }

    /// Which system this scheduler animates
    pub fn kind(&self) -> SystemKind {
        self.profile.kind
    }

    /// The profile the scheduler was configured with
    pub fn profile(&self) -> &StorageProfile {
        &self.profile
    }

    /// The current run state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Incremented every time pending work is cancelled
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the scheduler stopped because storage is full
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of checkpoints currently held in the fast tier
    pub fn retained_checkpoints(&self) -> u32 {
        self.levels.retained
    }

    /// When the step in progress ends, if there is one
    pub fn next_deadline(&self) -> Option<Millis> {
        self.active.map(|active| active.deadline)
    }

    /// Start a checkpoint cycle in response to the shared trigger.
    ///
    /// A trigger which has already been seen is ignored. If the previous cycle is still in
    /// progress, its remaining steps are completed immediately so the stored data stays
    /// consistent with the number of checkpoints.
    pub fn on_checkpoint(&mut self, trigger_id: u64, now: Millis) -> Vec<SchedulerSignal> {
        let mut signals = Vec::new();
        if self.halted {
            debug!("{}: ignoring checkpoint {trigger_id}, storage is full", self.kind());
            return signals;
        }
        if trigger_id <= self.state.cycle {
            debug!("{}: checkpoint {trigger_id} already handled", self.kind());
            return signals;
        }

        if self.active.is_some() {
            debug!(
                "{}: cycle {} still running at checkpoint {trigger_id}, completing it",
                self.kind(),
                self.state.cycle
            );
            while self.active.is_some() && !self.halted {
                self.complete_step(now, &mut signals);
            }
            if self.halted {
                self.refresh_state(now);
                return signals;
            }
        }

        self.state.cycle = trigger_id;
        self.begin_step(0, now, &mut signals);
        self.refresh_state(now);

        signals
    }

    /// Complete every step due at or before `now` and update the run state
    pub fn advance(&mut self, now: Millis) -> Vec<SchedulerSignal> {
        let mut signals = Vec::new();
        while let Some(active) = self.active {
            if active.deadline > now {
                break;
            }
            self.complete_step(active.deadline, &mut signals);
        }
        self.refresh_state(now);

        signals
    }

    /// Abandon the cycle in progress, leaving the stored data as of the last completed step
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.active = None;
        self.refresh_state(0);
    }

    /// Cancel any pending work and empty the storage
    pub fn reset(&mut self) {
        self.cancel();
        self.levels = Levels::default();
        self.halted = false;
        self.state = RunState::default();
    }

    /// Replace the profile, resetting the scheduler
    pub fn reconfigure(&mut self, profile: StorageProfile) {
        self.profile = profile;
        self.reset();
    }

    /// Finish the step in progress at `time` and start the next one
    fn complete_step(&mut self, time: Millis, signals: &mut Vec<SchedulerSignal>) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.levels = active.to;

        // Storage can only become full at the end of a write
        let full_level = if self.profile.plan[active.index].step == Step::Write {
            self.profile.full_level(&self.levels)
        } else {
            None
        };
        if let Some(fill_percent) = full_level {
            info!(
                "{}: storage is {fill_percent:.1}% full after checkpoint {}",
                self.kind(),
                self.state.cycle
            );
            self.halted = true;
            self.push_phase(Phase::Idle, time, signals);
            signals.push(SchedulerSignal::CapacityFull {
                system: self.kind(),
                fill_percent,
                time,
            });
            return;
        }

        self.begin_step(active.index + 1, time, signals);
    }

    /// Start step `index` of the plan at `time`, or end the cycle if there are no more steps
    fn begin_step(&mut self, index: usize, time: Millis, signals: &mut Vec<SchedulerSignal>) {
        let Some(planned) = self.profile.plan.get(index).copied() else {
            self.push_phase(Phase::Idle, time, signals);
            return;
        };

        let from = self.levels;
        let size = self.profile.checkpoint_size;
        let to = match planned.step {
            Step::Write => Levels {
                fast: from.fast + size,
                retained: from.retained + 1,
                ..from
            },
            Step::Migrate if from.retained > self.profile.checkpoints_retained => Levels {
                fast: (from.fast - size).max(Terabytes(0.0)),
                slow: from.slow + size,
                retained: from.retained - 1,
            },
            Step::Migrate => {
                // Nothing to migrate, so the cycle is over
                self.push_phase(Phase::Idle, time, signals);
                return;
            }
            Step::Pause | Step::Train => from,
        };

        self.active = Some(ActiveStep {
            index,
            started_at: time,
            deadline: time + planned.duration,
            from,
            to,
        });
        self.push_phase(planned.step.phase(), time, signals);
    }

    /// Record a phase change, if the phase differs from the current one
    fn push_phase(&mut self, phase: Phase, time: Millis, signals: &mut Vec<SchedulerSignal>) {
        if self.state.phase == phase {
            return;
        }

        debug!("{}: {phase} at {time} ms", self.kind());
        self.state.phase = phase;
        signals.push(SchedulerSignal::PhaseChanged {
            system: self.kind(),
            phase,
            time,
        });
    }

    /// Recompute the observable state for time `now`.
    ///
    /// Fill levels are updated before the phase so the two never disagree.
    fn refresh_state(&mut self, now: Millis) {
        let levels = match self.active {
            Some(active) => interpolate(&active, now),
            None => (self.levels.fast, self.levels.slow),
        };

        self.state.fast_tier_fill_percent =
            fill_percent(levels.0, self.profile.fast_tier_capacity);
        self.state.slow_tier_fill_percent = self
            .profile
            .slow_tier_capacity
            .map_or(0.0, |capacity| fill_percent(levels.1, capacity));
        self.state.is_active = self.active.is_some();
        self.state.phase = match self.active {
            Some(active) => self.profile.plan[active.index].step.phase(),
            None => Phase::Idle,
        };
    }
}

/// Fast and slow tier contents part-way through a step
fn interpolate(active: &ActiveStep, now: Millis) -> (Terabytes, Terabytes) {
    let span = active.deadline.saturating_sub(active.started_at);
    let progress = if span == 0 {
        1.0
    } else {
        (now.saturating_sub(active.started_at) as f64 / span as f64).clamp(0.0, 1.0)
    };

    let lerp = |from: Terabytes, to: Terabytes| Terabytes(from.0 + (to.0 - from.0) * progress);
    (
        lerp(active.from.fast, active.to.fast),
        lerp(active.from.slow, active.to.slow),
    )
}
