use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_tester::config::{default_config_path, EngineConfig};
use course_tester::models::*;
use course_tester::sequencing::SystemClock;
use course_tester::SequencingSession;

#[derive(Parser)]
#[command(name = "ctest")]
#[command(about = "Drive the sequencing of a packaged course from the command line")]
struct Cli {
    /// Config file to use instead of the one in the user's config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a course and apply a sequence of steps, printing the state after each
    Run {
        /// Course activity tree as JSON
        course: PathBuf,

        /// Steps such as `start`, `continue`, `choice:<id>`, `complete:<id>`,
        /// `pass:<id>`, `fail:<id>`, `measure:<id>=<value>`, `exit-mode:<id>=suspend`
        #[arg(trailing_var_arg = true)]
        steps: Vec<String>,

        /// Print only the final snapshot
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the activity tree and the initial snapshot
    Inspect {
        course: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Write the defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

/// One scripted step of a `run`.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Navigate(NavigationRequest),
    Progress {
        activity: String,
        progress: ActivityProgress,
    },
    ExitMode {
        activity: String,
        mode: ExitMode,
    },
}

fn parse_step(raw: &str) -> anyhow::Result<Step> {
    let (name, argument) = match raw.split_once(':') {
        Some((name, argument)) => (name, Some(argument)),
        None => (raw, None),
    };

    if let Some(request) = NavigationRequest::from_parts(name, argument) {
        return Ok(Step::Navigate(request));
    }

    let Some(argument) = argument.filter(|a| !a.is_empty()) else {
        bail!("Unknown step '{}'", raw);
    };
    let (activity, value) = match argument.split_once('=') {
        Some((activity, value)) => (activity.to_string(), Some(value)),
        None => (argument.to_string(), None),
    };
    let number = |value: Option<&str>| -> anyhow::Result<f64> {
        let value = value.with_context(|| format!("Step '{}' needs a value", raw))?;
        value
            .parse()
            .with_context(|| format!("Invalid number '{}' in step '{}'", value, raw))
    };

    let progress = match name {
        "complete" => ActivityProgress {
            completed: Some(true),
            ..ActivityProgress::default()
        },
        "incomplete" => ActivityProgress {
            completed: Some(false),
            ..ActivityProgress::default()
        },
        "pass" => ActivityProgress {
            satisfied: Some(true),
            ..ActivityProgress::default()
        },
        "fail" => ActivityProgress {
            satisfied: Some(false),
            ..ActivityProgress::default()
        },
        "measure" => ActivityProgress {
            measure: Some(number(value)?),
            ..ActivityProgress::default()
        },
        "progress" => ActivityProgress {
            progress_measure: Some(number(value)?),
            ..ActivityProgress::default()
        },
        "exit-mode" => {
            let value = value.unwrap_or_default();
            let mode = ExitMode::from_str(value)
                .with_context(|| format!("Unknown exit mode '{}'", value))?;
            return Ok(Step::ExitMode { activity, mode });
        }
        _ => bail!("Unknown step '{}'", raw),
    };
    Ok(Step::Progress { activity, progress })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepReport<'a> {
    step: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<NavigationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    snapshot: SequencingSnapshot,
}

fn apply_step(session: &mut SequencingSession, step: &Step) -> (Option<NavigationResult>, Option<String>) {
    match step {
        Step::Navigate(request) => (Some(session.process_navigation(request)), None),
        Step::Progress { activity, progress } => {
            match session.update_activity_progress(activity, progress.clone()) {
                Ok(()) => (None, None),
                Err(e) => (None, Some(e.to_string())),
            }
        }
        Step::ExitMode { activity, mode } => match session.handle_activity_exit(activity, *mode) {
            Ok(target) => (Some(NavigationResult::ok(target)), None),
            Err(e) => (Some(NavigationResult::failed(e.to_string())), None),
        },
    }
}

fn load_course(path: &Path) -> anyhow::Result<ActivityDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read course {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse course {}", path.display()))
}

/// Resolve the configuration before logging exists. A fallback to the
/// defaults comes back as a warning for the caller to log.
fn startup_config(cli: &Cli) -> anyhow::Result<(EngineConfig, Option<anyhow::Error>)> {
    // `config --init` writes the file, so it must not need one to exist.
    if let Commands::Config { init: true } = cli.command {
        return Ok((EngineConfig::default(), None));
    }
    match cli.config.as_deref() {
        Some(path) => Ok((EngineConfig::load_from(path)?, None)),
        None => Ok(EngineConfig::load_or_default()),
    }
}

/// Initialize tracing to stderr so stdout carries only JSON.
fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, warning) = startup_config(&cli)?;
    init_tracing(&config.log_filter);
    if let Some(e) = warning {
        tracing::warn!("Failed to load config, using defaults: {:#}", e);
    }

    match cli.command {
        Commands::Run {
            course,
            steps,
            quiet,
        } => {
            let steps = steps
                .iter()
                .map(|raw| parse_step(raw).map(|step| (raw.as_str(), step)))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let descriptor = load_course(&course)?;
            let mut session = SequencingSession::with_config(&descriptor, config, Arc::new(SystemClock))?;
            tracing::info!("Running {} steps against {}", steps.len(), course.display());

            for (raw, step) in &steps {
                let (result, error) = apply_step(&mut session, step);
                if !quiet {
                    print_json(&StepReport {
                        step: raw,
                        result,
                        error,
                        snapshot: session.get_sequencing_state(),
                    })?;
                }
            }
            if quiet {
                print_json(&session.get_sequencing_state())?;
            }
        }
        Commands::Inspect { course } => {
            let descriptor = load_course(&course)?;
            let session = SequencingSession::with_config(&descriptor, config, Arc::new(SystemClock))?;
            let tree = session.tree();
            for activity in tree.activities() {
                println!(
                    "{}{} [{}]{}",
                    "  ".repeat(activity.depth),
                    activity.title,
                    activity.id,
                    activity
                        .resource
                        .as_deref()
                        .map(|r| format!(" -> {}", r))
                        .unwrap_or_default()
                );
            }
            print_json(&session.get_sequencing_state())?;
        }
        Commands::Config { init } => {
            if init {
                let path = match cli.config {
                    Some(path) => path,
                    None => default_config_path()?,
                };
                if path.exists() {
                    bail!("Config file already exists at {}", path.display());
                }
                EngineConfig::default().save(&path)?;
                println!("Wrote default config to {}", path.display());
            } else {
                print_json(&config)?;
            }
        }
    }

    Ok(())
}
