//! Tests for CLI argument parsing functionality
//!
//! These tests verify that command line arguments are parsed, merged over
//! the defaults and validated, and that the resulting configuration builds
//! a runnable experiment.

use agent_sim_kernel::demo;
use agent_sim_kernel::types::config::{CliArgs, ConfigValidationError, ExperimentConfig};
use clap::Parser;

/// Test parsing of the transmission level list
#[test]
fn test_transmission_argument_parsing() {
    // Not given: the defaults apply
    let cli_args = CliArgs::try_parse_from(["test"]).unwrap();
    assert!(cli_args.transmission.is_none());
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert_eq!(config.transmission_probabilities, vec![0.05, 0.1, 0.2]);

    // Comma separated list
    let cli_args = CliArgs::try_parse_from(["test", "--transmission", "0.1,0.3"]).unwrap();
    assert_eq!(cli_args.transmission, Some(vec![0.1, 0.3]));

    // A single value is a list of one
    let cli_args = CliArgs::try_parse_from(["test", "--transmission", "0.25"]).unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert_eq!(config.transmission_probabilities, vec![0.25]);

    // Not a number
    assert!(CliArgs::try_parse_from(["test", "--transmission", "0.1,high"]).is_err());
}

/// Test the runner options and their short forms
#[test]
fn test_runner_argument_parsing() {
    let cli_args = CliArgs::try_parse_from([
        "test",
        "-j",
        "8",
        "-o",
        "results",
        "--seed",
        "42",
        "--replicates",
        "5",
        "--resume",
        "--halt-on-failure",
        "--halt-time",
        "30",
    ])
    .unwrap();

    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert_eq!(config.thread_count, 8);
    assert_eq!(config.output_directory, "results");
    assert_eq!(config.seed, Some(42));
    assert_eq!(config.replicates, 5);
    assert!(config.continue_from_progress);
    assert!(config.halt_on_failure);
    assert_eq!(config.halt_time, Some(30.0));
    config.validate().unwrap();

    let settings = config.experiment_settings(42);
    assert_eq!(settings.thread_count, 8);
    assert_eq!(settings.output_directory, std::path::PathBuf::from("results"));
    assert!(settings.continue_from_progress);
    assert_eq!(settings.halt_time, Some(30.0));
}

/// Test invalid values that parse but fail validation
#[test]
fn test_invalid_model_arguments() {
    // Zero threads parses, validation catches it
    let cli_args = CliArgs::try_parse_from(["test", "--threads", "0"]).unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert!(matches!(config.validate(), Err(ConfigValidationError::InvalidThreadCount(0))));

    // More initial infections than people
    let cli_args = CliArgs::try_parse_from(["test", "--population-size", "10", "--initial-infections", "11"]).unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigValidationError::InvalidInitialInfections { initial: 11, population: 10 })
    ));

    // Probability above one
    let cli_args = CliArgs::try_parse_from(["test", "--transmission", "0.5,1.5"]).unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    match config.validate() {
        Err(ConfigValidationError::InvalidProbability { field, value }) => {
            assert_eq!(field, "transmission_probabilities");
            assert_eq!(value, 1.5);
        }
        other => panic!("Expected InvalidProbability, got {:?}", other),
    }

    // Negative halt time
    let cli_args = CliArgs::try_parse_from(["test", "--halt-time=-1"]).unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    assert!(matches!(config.validate(), Err(ConfigValidationError::NotPositive { .. })));

    // Negative counts are rejected by the parser
    assert!(CliArgs::try_parse_from(["test", "--replicates", "-2"]).is_err());
}

/// Test the logging flags
#[test]
fn test_logging_flags() {
    let cli_args = CliArgs::try_parse_from(["test", "-v", "--log-dir", "logs"]).unwrap();
    assert!(cli_args.verbose);
    assert!(!cli_args.debug);
    assert!(!cli_args.quiet);
    assert_eq!(cli_args.log_dir.as_deref(), Some("logs"));

    let cli_args = CliArgs::try_parse_from(["test", "-q"]).unwrap();
    assert!(cli_args.quiet);
}

/// Test that the command line overrides a configuration file
#[test]
fn test_config_file_with_cli_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.json");
    std::fs::write(&path, r#"{ "population_size": 300, "replicates": 4, "thread_count": 2 }"#).unwrap();

    let args = CliArgs {
        config: Some(path.to_string_lossy().into_owned()),
        replicates: Some(1),
        ..CliArgs::default()
    };

    let config = ExperimentConfig::from_cli_args(args).unwrap();
    assert_eq!(config.population_size, 300);
    assert_eq!(config.thread_count, 2);
    assert_eq!(config.replicates, 1);
    assert_eq!(config.scenario_count(), 3);
}

/// Test that a parsed configuration builds an experiment of the right size
#[test]
fn test_configuration_builds_experiment() {
    let cli_args =
        CliArgs::try_parse_from(["test", "--population-size", "40", "--transmission", "0.1,0.2", "--replicates", "3"])
            .unwrap();
    let config = ExperimentConfig::from_cli_args(cli_args).unwrap();
    config.validate().unwrap();

    let experiment = demo::experiment(&config, 7).unwrap();
    let scenarios = experiment.expand().unwrap();
    assert_eq!(scenarios.len(), config.scenario_count());
    assert_eq!(scenarios.len(), 6);
    assert_eq!(experiment.meta_columns(), vec!["transmission_probability", "replicate"]);
}

/// Test that resuming without --seed reuses the recorded master seed
#[test]
fn test_resume_without_seed_reuses_recorded_seed() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().to_string_lossy().into_owned();
    let parse = |extra: &[&str]| {
        let mut argv = vec!["test", "--population-size", "30", "--transmission", "0.2", "--replicates", "2", "-o"];
        argv.push(output.as_str());
        argv.extend_from_slice(extra);
        let config = ExperimentConfig::from_cli_args(CliArgs::try_parse_from(argv).unwrap()).unwrap();
        config.validate().unwrap();
        config
    };

    // First invocation draws a seed
    let first = parse(&[]);
    assert!(first.seed.is_none());
    let drawn = first.master_seed().unwrap();
    let report = demo::experiment(&first, drawn).unwrap().execute().unwrap();
    assert!(report.all_succeeded());

    // The same command with --resume finds it again
    let resumed = parse(&["--resume"]);
    assert_eq!(resumed.master_seed().unwrap(), drawn);
    let report = demo::experiment(&resumed, drawn).unwrap().execute().unwrap();
    assert!(report.all_succeeded());
    assert_eq!(report.statistics.previously_succeeded, 2);

    // An explicit seed still wins
    let explicit = parse(&["--resume", "--seed", "5"]);
    assert_eq!(explicit.master_seed().unwrap(), 5);
}
