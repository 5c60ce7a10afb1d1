//! Integration tests for the `example run` command.
use ckptsim::cli::RunOpts;
use ckptsim::cli::example::handle_example_run_command;
use ckptsim::settings::Settings;
use tempfile::tempdir;

/// An integration test for the `example run` command.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var("CKPTSIM_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let opts = RunOpts {
        output_dir: Some(tempdir.path().to_path_buf()),
        duration_s: Some(60),
        timeline: true,
        ..RunOpts::default()
    };
    handle_example_run_command("small_cluster", &opts, Some(Settings::default())).unwrap();

    // One row per system per frame: 60 s of animation at 250 ms per frame
    let timeline = std::fs::read_to_string(tempdir.path().join("timeline.csv")).unwrap();
    assert_eq!(timeline.lines().count(), 1 + 2 * 240);
}
