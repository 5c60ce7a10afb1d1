//! The command line interface for the simulation.
use crate::config::Configuration;
use crate::log;
use crate::metrics::Metrics;
use crate::output::metadata::write_metadata;
use crate::output::{create_output_directory, get_output_dir};
use crate::settings::Settings;
use crate::simulation::RunLimits;
use crate::timing::Timing;
use crate::view::MetricsPanel;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// Number of checkpoints to run for if no other limit is given
pub const DEFAULT_RUN_CHECKPOINTS: u64 = 20;

/// The command line interface for the simulation.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Stop after this many checkpoints
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub checkpoints: Option<u64>,
    /// Stop after this many seconds of animation time
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub duration_s: Option<u64>,
    /// Animate the comparison in the terminal in real time
    #[arg(long)]
    pub live: bool,
    /// Whether to write the state of both systems at every frame to timeline.csv
    #[arg(long)]
    pub timeline: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a scenario.
    Run {
        /// Path to the scenario directory.
        scenario_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example scenarios.
    Example {
        /// The available subcommands for managing example scenarios.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a scenario.
    Validate {
        /// The path to the scenario directory.
        scenario_dir: PathBuf,
    },
    /// Print the derived metrics and cost summary for a scenario.
    Metrics {
        /// The path to the scenario directory.
        scenario_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { scenario_dir, opts } => handle_run_command(&scenario_dir, &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { scenario_dir } => handle_validate_command(&scenario_dir, None),
            Self::Metrics { scenario_dir } => handle_metrics_command(&scenario_dir),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start ckptsim
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ ckptsim --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

impl RunOpts {
    /// When the run should stop, falling back on settings where options are not given
    fn limits(&self, settings: &Settings) -> RunLimits {
        let duration = self.duration_s.map(|seconds| seconds * 1000);
        let checkpoints = match (self.checkpoints, duration) {
            (None, None) => Some(DEFAULT_RUN_CHECKPOINTS),
            (checkpoints, _) => checkpoints,
        };

        RunLimits {
            checkpoints,
            duration,
            live: self.live,
            write_timeline: self.timeline || settings.write_timeline,
            frame_interval_ms: settings.frame_interval_ms,
        }
    }
}

/// Handle the `run` command.
pub fn handle_run_command(
    scenario_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(scenario_path)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger, keeping stdout clear if we are drawing the animation
    log::init(Some(&settings.log_level), Some(output_path), !opts.live)
        .context("Failed to initialise logging.")?;

    // Load the scenario to run
    let config = Configuration::from_path(scenario_path).context("Failed to load scenario.")?;
    info!("Loaded scenario from {}", scenario_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let timing = Timing::new(&config, &Metrics::derive(&config));
    write_metadata(output_path, scenario_path, &config, &timing)
        .context("Failed to save metadata.")?;

    // Run the simulation
    crate::simulation::run(&config, output_path, &opts.limits(&settings))?;
    info!("Simulation complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(scenario_path: &Path, settings: Option<Settings>) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(&settings.log_level), None, true).context("Failed to initialise logging.")?;

    // Load/validate the scenario
    Configuration::from_path(scenario_path).context("Failed to validate scenario.")?;
    info!("Scenario validation successful!");

    Ok(())
}

/// Handle the `metrics` command.
pub fn handle_metrics_command(scenario_path: &Path) -> Result<()> {
    let config = Configuration::from_path(scenario_path).context("Failed to load scenario.")?;
    let metrics = Metrics::derive(&config);
    print!(
        "{}",
        MetricsPanel {
            config: &config,
            metrics: &metrics
        }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RunOpts::default().limits(&Settings::default());
        assert_eq!(limits.checkpoints, Some(DEFAULT_RUN_CHECKPOINTS));
        assert_eq!(limits.duration, None);
        assert_eq!(limits.frame_interval_ms, 250);
        assert!(!limits.write_timeline);
    }

    #[test]
    fn test_limits_from_options() {
        let opts = RunOpts {
            duration_s: Some(60),
            timeline: true,
            ..RunOpts::default()
        };
        let limits = opts.limits(&Settings::default());
        assert_eq!(limits.checkpoints, None);
        assert_eq!(limits.duration, Some(60_000));
        assert!(limits.write_timeline);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
