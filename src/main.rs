//! PharmaFlow CLI Entry Point
//!
//! Replays workflow definitions through the orchestration engine and prints
//! the resulting timelines and analytics.
//!
//! # Usage
//!
//! ```bash
//! # Run definitions with the default 2s step turnaround
//! pharmaflow workflows.yaml
//!
//! # Faster turnaround and a custom config
//! pharmaflow workflows.yaml --delay-ms 200 --config engine.yaml
//!
//! # Analytics over an explicit range, as JSON
//! pharmaflow workflows.yaml --period 2024-06-01..2024-06-30 --json
//! ```

use std::env;
use std::error::Error;
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info, warn};

use pharmaflow::monitoring::{AnalyticsPeriod, StepTimeline};
use pharmaflow::store::WorkflowFilter;
use pharmaflow::workflow::{load_definitions, WorkflowStatus};
use pharmaflow::{Engine, EngineConfig, APP_NAME, VERSION};

/// Default definitions file used when none is specified.
const DEFAULT_DEFINITIONS: &str = "workflows.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    definitions_path: String,
    config_path: Option<String>,
    period: AnalyticsPeriod,
    delay_ms: Option<u64>,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definitions_path: DEFAULT_DEFINITIONS.to_string(),
            config_path: None,
            period: AnalyticsPeriod::default(),
            delay_ms: None,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Cross-Module Workflow Orchestration");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: pharmaflow [OPTIONS] <DEFINITIONS_FILE>");
    println!();
    println!("Arguments:");
    println!("  <DEFINITIONS_FILE>  Path to workflow definitions YAML file");
    println!();
    println!("Options:");
    println!("  --config PATH       Engine configuration YAML file");
    println!("  --period P          Analytics period: 7d, 30d, 90d or FROM..TO (default: 30d)");
    println!("  --delay-ms N        Simulated step turnaround in milliseconds");
    println!("  --json              Print analytics as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  pharmaflow workflows.yaml");
    println!("  pharmaflow workflows.yaml --delay-ms 200 --period 7d");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => {
                config.json = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                i += 1;
                let value = args.get(i).ok_or("--config requires a path argument")?;
                config.config_path = Some(value.clone());
            }
            "--period" => {
                i += 1;
                let value = args.get(i).ok_or("--period requires a value")?;
                config.period = value.parse()?;
            }
            "--delay-ms" => {
                i += 1;
                let value = args.get(i).ok_or("--delay-ms requires a number argument")?;
                config.delay_ms = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid delay value: {}", value))?,
                );
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.definitions_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Colors a workflow status for terminal output.
fn paint_status(status: WorkflowStatus) -> colored::ColoredString {
    match status {
        WorkflowStatus::Completed => status.as_str().green(),
        WorkflowStatus::Failed => status.as_str().red(),
        WorkflowStatus::InProgress => status.as_str().yellow(),
        WorkflowStatus::Pending => status.as_str().dimmed(),
    }
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let mut engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(delay_ms) = config.delay_ms {
        engine_config.completion_delay_ms = delay_ms;
    }
    info!("Step turnaround: {} ms", engine_config.completion_delay_ms);

    let definitions = load_definitions(&config.definitions_path).map_err(|e| {
        error!("Failed to load definitions: {}", e);
        format!(
            "Could not load definitions from '{}': {}",
            config.definitions_path, e
        )
    })?;

    let engine = Engine::new(engine_config);

    for definition in &definitions {
        let workflow = match engine.create_workflow(definition.to_request()) {
            Ok(workflow) => workflow,
            Err(e) => {
                warn!("Skipping definition: {}", e);
                continue;
            }
        };

        for step in workflow.steps() {
            engine.execute_step(&workflow.id, &step.id).await?;
        }

        // Simulated module reports override the background completion.
        for (position, outcome) in definition.outcomes() {
            let Some(step) = workflow.steps().get(position) else {
                continue;
            };
            if let Err(e) = engine.update_step(&workflow.id, &step.id, outcome, None) {
                warn!("Could not report '{}' for step '{}': {}", outcome, step.id, e);
            }
        }
    }

    info!(
        "Waiting for {} background completions",
        engine.pending_completions()
    );
    engine.settle().await;

    for workflow in engine.list_workflows(&WorkflowFilter::new()) {
        println!();
        println!(
            "{} {} [{}]",
            workflow.workflow_type,
            workflow.metadata.source_id,
            paint_status(workflow.status())
        );
        for step in workflow.steps() {
            println!("  {:12} {:18} {}", step.id, step.module.as_str(), step.status);
        }
        print!("{}", StepTimeline::from_workflow(&workflow).gantt_chart());
    }

    let report = engine.analytics(config.period);
    println!();
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.get_summary());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
