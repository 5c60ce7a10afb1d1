//! Integration tests for the `validate` command.
use ckptsim::cli::handle_validate_command;
use ckptsim::log::is_logger_initialised;
use ckptsim::settings::Settings;
use std::path::PathBuf;

/// Get the path to the example scenario.
fn get_scenario_dir() -> PathBuf {
    PathBuf::from("demos/default")
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    unsafe { std::env::set_var("CKPTSIM_LOG_LEVEL", "off") };

    assert!(!is_logger_initialised());

    handle_validate_command(&get_scenario_dir(), Some(Settings::default())).unwrap();

    assert!(is_logger_initialised());

    // The logger can only be set up once per process, and trying again is an error
    assert_eq!(
        handle_validate_command(&get_scenario_dir(), Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        "Failed to initialise logging."
    );
    assert!(is_logger_initialised());
}
