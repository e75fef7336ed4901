//! Configuration for experiment runs
//!
//! Settings come from three layers, highest priority first: command-line
//! arguments, a JSON configuration file, built-in defaults. The merged
//! configuration is validated before any scenario is expanded.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::experiment::{ExperimentError, ExperimentSettings, ProgressLog, PROGRESS_FILE};

/// Command line arguments structure
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "agent-sim",
    version,
    about = "Agent Simulation Kernel - runs deterministic multi-scenario contagion experiments",
    long_about = "Runs the demonstration contagion model as an experiment: every combination of transmission probability and replicate becomes one scenario, scenarios run in parallel with seeds derived from the master seed, and report rows are written to resumable tab-delimited files.

EXAMPLES:
    # Run with default settings
    agent-sim

    # Use a configuration file
    agent-sim --config experiment.json

    # Override specific settings
    agent-sim --population-size 5000 --transmission 0.05,0.1,0.2 --threads 8

    # Continue an interrupted experiment
    agent-sim --output-dir runs/today --resume

    # Generate configuration template
    agent-sim --print-config > experiment.json

    # Validate configuration without running
    agent-sim --config experiment.json --dry-run

CONFIGURATION:
    Configuration can be provided via:
    1. Command line arguments (highest priority)
    2. Configuration file (--config flag)
    3. Default values (lowest priority)

    Supported configuration file formats: JSON (.json)"
)]
pub struct CliArgs {
    /// Configuration file path (JSON format)
    #[arg(
        short,
        long,
        help = "Configuration file path (JSON format)",
        long_help = "Path to a JSON configuration file. CLI arguments will override file settings."
    )]
    pub config: Option<String>,

    /// Number of people in every scenario
    #[arg(long, help = "Number of people in every scenario")]
    pub population_size: Option<usize>,

    /// People infectious at time zero
    #[arg(long, help = "People infectious at time zero")]
    pub initial_infections: Option<usize>,

    /// Transmission probabilities, one scenario level each
    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated transmission probabilities (0.0-1.0)",
        long_help = "Transmission probability per contact. Each value becomes one level of the transmission dimension."
    )]
    pub transmission: Option<Vec<f64>>,

    /// Contacts per infectious person per day
    #[arg(long, help = "Contacts per infectious person per day")]
    pub contact_rate: Option<f64>,

    /// Days from infection to recovery
    #[arg(long, help = "Days from infection to recovery")]
    pub infectious_period: Option<f64>,

    /// Last day on which contacts are scheduled
    #[arg(long, help = "Last day on which contacts are scheduled")]
    pub horizon: Option<f64>,

    /// Replicates of every parameter combination
    #[arg(long, help = "Replicates of every parameter combination")]
    pub replicates: Option<usize>,

    /// Worker threads
    #[arg(short = 'j', long, help = "Worker threads")]
    pub threads: Option<usize>,

    /// Master seed
    #[arg(long, help = "Master seed for reproducible results")]
    pub seed: Option<u64>,

    /// Directory for report files and the progress log
    #[arg(short, long, help = "Output directory for report files and the progress log")]
    pub output_dir: Option<String>,

    /// Skip scenarios the progress log records as succeeded
    #[arg(long, help = "Continue from the progress log in the output directory")]
    pub resume: bool,

    /// Stop at the first failed scenario
    #[arg(long, help = "Stop the experiment at the first failed scenario")]
    pub halt_on_failure: bool,

    /// Halt time applied to every scenario
    #[arg(long, help = "Stop every scenario before plans scheduled after this time")]
    pub halt_time: Option<f64>,

    /// Also write JSON logs to daily files in this directory
    #[arg(long, help = "Write JSON logs to daily rolling files in this directory")]
    pub log_dir: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, help = "Only log warnings and errors")]
    pub quiet: bool,

    /// Validate configuration without running
    #[arg(long, help = "Validate configuration without running the experiment")]
    pub dry_run: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in JSON format and exit")]
    pub print_config: bool,
}

/// Configuration file structure (allows partial configuration)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Number of people in every scenario
    pub population_size: Option<usize>,

    /// People infectious at time zero
    pub initial_infections: Option<usize>,

    /// Transmission probability levels
    pub transmission_probabilities: Option<Vec<f64>>,

    /// Contacts per infectious person per day
    pub contact_rate: Option<f64>,

    /// Days from infection to recovery
    pub infectious_period: Option<f64>,

    /// Last day on which contacts are scheduled
    pub horizon: Option<f64>,

    /// Replicates of every parameter combination
    pub replicates: Option<usize>,

    /// Worker threads
    pub thread_count: Option<usize>,

    /// Master seed
    pub seed: Option<u64>,

    /// Output directory
    pub output_directory: Option<String>,

    /// Continue from the progress log
    pub continue_from_progress: Option<bool>,

    /// Stop at the first failed scenario
    pub halt_on_failure: Option<bool>,

    /// Halt time applied to every scenario
    pub halt_time: Option<f64>,
}

/// Configuration of one experiment over the demonstration model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    /// Number of people in every scenario
    pub population_size: usize,

    /// People infectious at time zero
    pub initial_infections: usize,

    /// Transmission probability levels (0.0-1.0)
    pub transmission_probabilities: Vec<f64>,

    /// Contacts per infectious person per day
    pub contact_rate: f64,

    /// Days from infection to recovery
    pub infectious_period: f64,

    /// Last day on which contacts are scheduled
    pub horizon: f64,

    /// Replicates of every parameter combination
    pub replicates: usize,

    /// Worker threads
    pub thread_count: usize,

    /// Master seed; drawn at random when absent
    pub seed: Option<u64>,

    /// Directory for report files and the progress log
    pub output_directory: String,

    /// Skip scenarios the progress log records as succeeded
    pub continue_from_progress: bool,

    /// Stop at the first failed scenario
    pub halt_on_failure: bool,

    /// Halt time applied to every scenario
    pub halt_time: Option<f64>,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Configuration file read error
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// JSON parsing error
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format: {0} (supported: .json)")]
    UnsupportedFormat(String),
}

/// Validation errors for experiment configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    /// Population size is invalid
    #[error("Population size must be greater than 0, got {0}")]
    InvalidPopulationSize(usize),

    /// Initial infections exceed the population or are zero
    #[error("Initial infections must be between 1 and {population}, got {initial}")]
    InvalidInitialInfections {
        /// Requested initial infections
        initial: usize,
        /// Population size
        population: usize,
    },

    /// Probability value is out of range
    #[error("Invalid probability for {field}: {value} (must be between 0.0 and 1.0)")]
    InvalidProbability {
        /// Name of the field
        field: String,
        /// The invalid value
        value: f64,
    },

    /// Rate or duration is not positive
    #[error("{field} must be a positive number, got {value}")]
    NotPositive {
        /// Name of the field
        field: String,
        /// The invalid value
        value: f64,
    },

    /// No transmission levels were given
    #[error("At least one transmission probability is required")]
    NoTransmissionLevels,

    /// Replicate count is invalid
    #[error("Replicates must be greater than 0, got {0}")]
    InvalidReplicates(usize),

    /// Thread count is invalid
    #[error("Thread count must be greater than 0, got {0}")]
    InvalidThreadCount(usize),

    /// Output directory is empty
    #[error("Output directory must not be empty")]
    EmptyOutputDirectory,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            population_size: 1_000,
            initial_infections: 5,
            transmission_probabilities: vec![0.05, 0.1, 0.2],
            contact_rate: 2.0,
            infectious_period: 7.0,
            horizon: 100.0,
            replicates: 2,
            thread_count: 4,
            seed: None,
            output_directory: "output".to_string(),
            continue_from_progress: false,
            halt_on_failure: false,
            halt_time: None,
        }
    }
}

impl ExperimentConfig {
    /// Create configuration from parsed CLI arguments
    pub fn from_cli_args(args: CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(config_path) = &args.config {
            config = Self::from_file(config_path)?;
        }

        // CLI takes precedence
        Self::apply_cli_overrides(&mut config, args);

        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let content = fs::read_to_string(path)?;
                let config_file: ConfigFile = serde_json::from_str(&content)?;
                Ok(Self::from_config_file(config_file))
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }

    /// Create configuration from a config file, merging with defaults
    fn from_config_file(config_file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            population_size: config_file.population_size.unwrap_or(defaults.population_size),
            initial_infections: config_file.initial_infections.unwrap_or(defaults.initial_infections),
            transmission_probabilities: config_file
                .transmission_probabilities
                .unwrap_or(defaults.transmission_probabilities),
            contact_rate: config_file.contact_rate.unwrap_or(defaults.contact_rate),
            infectious_period: config_file.infectious_period.unwrap_or(defaults.infectious_period),
            horizon: config_file.horizon.unwrap_or(defaults.horizon),
            replicates: config_file.replicates.unwrap_or(defaults.replicates),
            thread_count: config_file.thread_count.unwrap_or(defaults.thread_count),
            seed: config_file.seed.or(defaults.seed),
            output_directory: config_file.output_directory.unwrap_or(defaults.output_directory),
            continue_from_progress: config_file
                .continue_from_progress
                .unwrap_or(defaults.continue_from_progress),
            halt_on_failure: config_file.halt_on_failure.unwrap_or(defaults.halt_on_failure),
            halt_time: config_file.halt_time.or(defaults.halt_time),
        }
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(config: &mut Self, args: CliArgs) {
        if let Some(value) = args.population_size {
            config.population_size = value;
        }
        if let Some(value) = args.initial_infections {
            config.initial_infections = value;
        }
        if let Some(value) = args.transmission {
            config.transmission_probabilities = value;
        }
        if let Some(value) = args.contact_rate {
            config.contact_rate = value;
        }
        if let Some(value) = args.infectious_period {
            config.infectious_period = value;
        }
        if let Some(value) = args.horizon {
            config.horizon = value;
        }
        if let Some(value) = args.replicates {
            config.replicates = value;
        }
        if let Some(value) = args.threads {
            config.thread_count = value;
        }
        if let Some(value) = args.seed {
            config.seed = Some(value);
        }
        if let Some(value) = args.output_dir {
            config.output_directory = value;
        }
        if let Some(value) = args.halt_time {
            config.halt_time = Some(value);
        }

        // Flags can only switch these on
        if args.resume {
            config.continue_from_progress = true;
        }
        if args.halt_on_failure {
            config.halt_on_failure = true;
        }
    }

    /// Print configuration as JSON
    pub fn print_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.population_size == 0 {
            return Err(ConfigValidationError::InvalidPopulationSize(self.population_size));
        }

        if self.initial_infections == 0 || self.initial_infections > self.population_size {
            return Err(ConfigValidationError::InvalidInitialInfections {
                initial: self.initial_infections,
                population: self.population_size,
            });
        }

        if self.transmission_probabilities.is_empty() {
            return Err(ConfigValidationError::NoTransmissionLevels);
        }
        for &probability in &self.transmission_probabilities {
            self.validate_probability("transmission_probabilities", probability)?;
        }

        self.validate_positive("contact_rate", self.contact_rate)?;
        self.validate_positive("infectious_period", self.infectious_period)?;
        self.validate_positive("horizon", self.horizon)?;
        if let Some(halt_time) = self.halt_time {
            self.validate_positive("halt_time", halt_time)?;
        }

        if self.replicates == 0 {
            return Err(ConfigValidationError::InvalidReplicates(self.replicates));
        }

        if self.thread_count == 0 {
            return Err(ConfigValidationError::InvalidThreadCount(self.thread_count));
        }

        if self.output_directory.trim().is_empty() {
            return Err(ConfigValidationError::EmptyOutputDirectory);
        }

        Ok(())
    }

    fn validate_probability(&self, field: &str, value: f64) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigValidationError::InvalidProbability { field: field.to_string(), value });
        }
        Ok(())
    }

    fn validate_positive(&self, field: &str, value: f64) -> Result<(), ConfigValidationError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigValidationError::NotPositive { field: field.to_string(), value });
        }
        Ok(())
    }

    /// Number of scenarios the experiment expands to
    pub fn scenario_count(&self) -> usize {
        self.transmission_probabilities.len() * self.replicates
    }

    /// Master seed for this invocation
    ///
    /// A configured seed wins. Resuming without one reuses the seed recorded
    /// in the output directory's progress log; otherwise a fresh seed is drawn.
    pub fn master_seed(&self) -> Result<u64, ExperimentError> {
        if let Some(seed) = self.seed {
            return Ok(seed);
        }
        if self.continue_from_progress {
            let path = Path::new(&self.output_directory).join(PROGRESS_FILE);
            if path.exists() {
                return Ok(ProgressLog::read(&path)?.master_seed);
            }
        }
        Ok(rand::random())
    }

    /// Runner settings with the given master seed
    pub fn experiment_settings(&self, master_seed: u64) -> ExperimentSettings {
        ExperimentSettings {
            thread_count: self.thread_count,
            master_seed,
            output_directory: PathBuf::from(&self.output_directory),
            continue_from_progress: self.continue_from_progress,
            halt_on_failure: self.halt_on_failure,
            halt_time: self.halt_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_config_default() {
        let config = ExperimentConfig::default();

        assert_eq!(config.population_size, 1_000);
        assert_eq!(config.initial_infections, 5);
        assert_eq!(config.transmission_probabilities, vec![0.05, 0.1, 0.2]);
        assert_eq!(config.replicates, 2);
        assert_eq!(config.scenario_count(), 6);
        assert!(config.seed.is_none());
        assert!(!config.continue_from_progress);
        config.validate().unwrap();
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs::try_parse_from([
            "agent-sim",
            "--transmission",
            "0.1,0.3",
            "-j",
            "8",
            "--resume",
            "--output-dir",
            "runs",
        ])
        .unwrap();
        assert_eq!(args.transmission, Some(vec![0.1, 0.3]));
        assert_eq!(args.threads, Some(8));
        assert!(args.resume);

        let config = ExperimentConfig::from_cli_args(args).unwrap();
        assert_eq!(config.transmission_probabilities, vec![0.1, 0.3]);
        assert_eq!(config.thread_count, 8);
        assert_eq!(config.output_directory, "runs");
        assert!(config.continue_from_progress);
        // Untouched fields keep their defaults
        assert_eq!(config.population_size, 1_000);
    }

    #[test]
    fn test_config_file_loading() {
        use std::io::Write;
        use tempfile::Builder;

        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        let config_json = r#"{
            "population_size": 500,
            "transmission_probabilities": [0.25],
            "seed": 12345,
            "halt_on_failure": true
        }"#;
        temp_file.write_all(config_json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = ExperimentConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.population_size, 500);
        assert_eq!(config.transmission_probabilities, vec![0.25]);
        assert_eq!(config.seed, Some(12345));
        assert!(config.halt_on_failure);
        assert_eq!(config.contact_rate, 2.0);
    }

    #[test]
    fn test_cli_overrides_file() {
        use std::io::Write;
        use tempfile::Builder;

        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        temp_file.write_all(br#"{"population_size": 500, "replicates": 3}"#).unwrap();
        temp_file.flush().unwrap();

        let args = CliArgs {
            config: Some(temp_file.path().display().to_string()),
            population_size: Some(800),
            ..CliArgs::default()
        };
        let config = ExperimentConfig::from_cli_args(args).unwrap();
        assert_eq!(config.population_size, 800);
        assert_eq!(config.replicates, 3);
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        assert!(matches!(
            ExperimentConfig::from_file("/nonexistent/experiment.json"),
            Err(ConfigError::FileNotFound(_))
        ));

        let temp_file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            ExperimentConfig::from_file(temp_file.path()),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_validation_errors() {
        let config = ExperimentConfig { population_size: 0, ..ExperimentConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigValidationError::InvalidPopulationSize(0))));

        let config = ExperimentConfig { initial_infections: 2_000, ..ExperimentConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidInitialInfections { initial: 2_000, population: 1_000 })
        ));

        let config = ExperimentConfig { transmission_probabilities: vec![0.1, 1.5], ..ExperimentConfig::default() };
        match config.validate() {
            Err(ConfigValidationError::InvalidProbability { field, value }) => {
                assert_eq!(field, "transmission_probabilities");
                assert_eq!(value, 1.5);
            }
            other => panic!("Expected InvalidProbability, got {:?}", other),
        }

        let config = ExperimentConfig { transmission_probabilities: vec![], ..ExperimentConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigValidationError::NoTransmissionLevels)));

        let config = ExperimentConfig { contact_rate: -1.0, ..ExperimentConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigValidationError::NotPositive { .. })));

        let config = ExperimentConfig { thread_count: 0, ..ExperimentConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigValidationError::InvalidThreadCount(0))));
    }

    #[test]
    fn test_print_json_and_settings() {
        let config = ExperimentConfig { seed: Some(9), ..ExperimentConfig::default() };
        let json = config.print_json().unwrap();
        let parsed: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        let settings = config.experiment_settings(9);
        assert_eq!(settings.master_seed, 9);
        assert_eq!(settings.thread_count, 4);
        assert_eq!(settings.output_directory, PathBuf::from("output"));
    }
}
