mod checker;
mod config;
mod engine;
mod evaluator;
mod executor;
mod partition;
mod report;
mod similarity;

#[cfg(test)]
mod test_support;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use config::EvaluatorConfig;
use engine::PythonEngine;
use spi_common::dataset;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "spi-judge")]
#[command(about = "Judge generated pre-/post-condition predicates against reference solutions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate candidate completions and write the report
    Evaluate {
        /// Dataset file (JSON array or JSON lines)
        #[arg(short, long)]
        dataset: PathBuf,

        /// Report basename; `.csv` is appended
        #[arg(short, long)]
        report: Option<String>,

        /// Only evaluate the task with this id
        #[arg(short, long)]
        task: Option<String>,

        /// Move the second test group into the base tests
        #[arg(long, default_value = "false")]
        merge_second_suite: bool,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Evaluator config file (defaults to config/evaluator.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run every reference solution on its own tests
    Check {
        /// Dataset file (JSON array or JSON lines)
        #[arg(short, long)]
        dataset: PathBuf,

        /// Evaluator config file (defaults to config/evaluator.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    let config = match path {
        Some(path) => EvaluatorConfig::load(path),
        None => EvaluatorConfig::load_default(),
    };
    config.map_err(|e| {
        error!("Failed to load evaluator configuration: {:#}", e);
        e
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            dataset,
            report: report_basename,
            task,
            merge_second_suite,
            timeout_ms,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if merge_second_suite {
                config.merge_second_suite_into_base = true;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.call_timeout_ms = timeout_ms;
            }
            config.validate()?;

            let mut tasks = dataset::load_tasks(&dataset)?;
            if let Some(task_id) = task.as_deref() {
                tasks = dataset::select_task(tasks, task_id)?;
            }

            info!(
                tasks = tasks.len(),
                python = %config.python,
                call_timeout_ms = config.call_timeout_ms,
                merge_second_suite = config.merge_second_suite_into_base,
                "Evaluating dataset"
            );

            let engine = PythonEngine::new_with_config(&config);
            executor::evaluate_tasks(&mut tasks, &engine, &config).await;

            if let Some(basename) = report_basename {
                let path = PathBuf::from(format!("{}.csv", basename));
                report::write_report(&tasks, &path)?;
                info!(path = %path.display(), "Report written");
            }
            report::print_acceptance_summary(&tasks);
        }
        Commands::Check { dataset, config } => {
            let config = load_config(config.as_deref())?;
            let tasks = dataset::load_tasks(&dataset)?;

            let engine = PythonEngine::new_with_config(&config);
            let report = checker::check_dataset(&tasks, &engine, &config).await;
            report.print();

            if !report.is_clean() {
                bail!(
                    "Dataset check failed: {} broken reference conditions, program checks passed: {}",
                    report.broken_references(),
                    report.all_programs_pass()
                );
            }
        }
    }

    Ok(())
}
