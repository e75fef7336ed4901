// Agent Simulation Kernel - Main Entry Point
//
// Runs the demonstration contagion model as a multi-scenario experiment:
//
// ```console
// $ cargo build --release
// $ ./target/release/agent-sim --transmission 0.05,0.1 --replicates 4 --threads 8
// ```
//
// An interrupted experiment continues where it stopped:
//
// ```console
// $ ./target/release/agent-sim --output-dir runs/today --resume
// ```

use agent_sim_kernel::demo;
use agent_sim_kernel::experiment::ExperimentReport;
use agent_sim_kernel::simulation::LoggingConfig;
use agent_sim_kernel::types::{CliArgs, ExperimentConfig};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::process;
use tracing::{error, info, warn};

fn main() {
    // Parse CLI arguments first to check for special flags
    let args = CliArgs::parse();

    // Handle special CLI flags that don't require full initialization
    if args.print_config {
        match ExperimentConfig::default().print_json() {
            Ok(json) => {
                println!("{}", json);
                return;
            }
            Err(e) => {
                eprintln!("Failed to serialize default configuration: {}", e);
                process::exit(1);
            }
        }
    }

    let mut logging = LoggingConfig::from_verbosity(args.quiet, args.verbose, args.debug);
    if let Some(directory) = &args.log_dir {
        logging = logging.with_file_logging(directory.clone());
    }
    // The guard flushes buffered log writers on drop
    let guard = match logging.init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let code = match run(args) {
        Ok(None) => 0,
        Ok(Some(report)) if report.all_succeeded() => {
            info!("Experiment completed successfully");
            0
        }
        Ok(Some(report)) => {
            warn!("{} scenario(s) failed", report.statistics.failed);
            2
        }
        Err(e) => {
            error!("Experiment failed: {:#}", e);
            1
        }
    };

    // process::exit skips destructors
    drop(guard);
    if code != 0 {
        process::exit(code);
    }
}

/// Run the configured experiment; `None` for a dry run
fn run(args: CliArgs) -> anyhow::Result<Option<ExperimentReport>> {
    let dry_run = args.dry_run;

    let config = ExperimentConfig::from_cli_args(args).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    info!("Configuration loaded and validated successfully");

    if dry_run {
        eprintln!("Configuration validation successful!");
        eprintln!("Dry run mode - experiment will not be executed.");
        print_configuration_summary(&config, None);
        return Ok(None);
    }

    let master_seed = config.master_seed().context("Failed to determine the master seed")?;
    if config.seed.is_none() {
        info!(master_seed, "No seed configured, using master seed {}", master_seed);
    }
    print_configuration_summary(&config, Some(master_seed));

    let experiment = demo::experiment(&config, master_seed)
        .map_err(|e| anyhow!("Invalid model parameters: {}", e))?;
    let report = experiment.execute().context("Experiment execution failed")?;

    for (scenario, detail) in &report.failures {
        eprintln!("Scenario {} failed: {}", scenario, detail);
    }
    eprintln!("{}", report.statistics.generate_summary_report());
    Ok(Some(report))
}

/// Print configuration summary
fn print_configuration_summary(config: &ExperimentConfig, master_seed: Option<u64>) {
    eprintln!("Agent Simulation Kernel");
    eprintln!("=======================");
    eprintln!("Configuration:");
    eprintln!("  Population Size: {}", config.population_size);
    eprintln!("  Initial Infections: {}", config.initial_infections);
    eprintln!("  Transmission Probabilities: {:?}", config.transmission_probabilities);
    eprintln!("  Contact Rate: {:.2}/day", config.contact_rate);
    eprintln!("  Infectious Period: {:.1} days", config.infectious_period);
    eprintln!("  Horizon: {:.1} days", config.horizon);
    eprintln!("  Replicates: {}", config.replicates);
    eprintln!("  Scenarios: {}", config.scenario_count());
    eprintln!("  Threads: {}", config.thread_count);
    eprintln!("  Output Directory: {}", config.output_directory);
    if config.continue_from_progress {
        eprintln!("  Resuming from progress log");
    }
    if let Some(halt_time) = config.halt_time {
        eprintln!("  Halt Time: {:.1}", halt_time);
    }
    if let Some(seed) = master_seed {
        eprintln!("  Master Seed: {}", seed);
    }
    eprintln!();
}
