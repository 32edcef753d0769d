mod cli;
mod config;
mod logging;
mod master;
mod prompts_cmd;
mod worker;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use convo_core::ShardPlan;
use engine_logging::{engine_error, engine_info, set_worker_label};
use log::LevelFilter;

use crate::cli::{Cli, Command, RunArgs};
use crate::config::AppConfig;
use crate::logging::LogDestination;
use crate::worker::EXIT_FAILURE;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => run(&args),
        Command::ExtractPrompts(args) => {
            logging::initialize(LogDestination::Terminal, LevelFilter::Info);
            match prompts_cmd::extract_prompts(&args) {
                Ok(_) => 0,
                Err(err) => {
                    engine_error!("extract-prompts failed: {err:#}");
                    EXIT_FAILURE
                }
            }
        }
        Command::Sites { config } => list_sites(config.as_deref()),
    };
    ExitCode::from(code)
}

fn run(args: &RunArgs) -> u8 {
    let shard = match args.shard_plan() {
        Ok(shard) => shard,
        Err(err) => {
            eprintln!("convo: {err}");
            return EXIT_FAILURE;
        }
    };
    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("convo: {err:#}");
            return EXIT_FAILURE;
        }
    };
    config.apply_overrides(args);

    if let Some(workers) = args.spawn_workers {
        logging::initialize(
            logging::run_destination(&config.log_dir, &args.site, ShardPlan::single()),
            LevelFilter::Info,
        );
        set_worker_label("master");
        return match master::run_master(args, &config, workers.get()) {
            Ok(code) => code,
            Err(err) => {
                engine_error!("Master failed: {err:#}");
                EXIT_FAILURE
            }
        };
    }

    logging::initialize(
        logging::run_destination(&config.log_dir, &args.site, shard),
        LevelFilter::Info,
    );
    if shard.is_sharded() {
        set_worker_label(shard.to_string());
    }
    match worker::run_worker(&config, &args.site, &args.inputs, shard) {
        Ok(report) => {
            for summary in &report.summaries {
                engine_info!(
                    "{}: total {}, already done {}, assigned {}, persisted {}, failed {}{}",
                    summary.task_id,
                    summary.total,
                    summary.already_done,
                    summary.assigned,
                    summary.persisted,
                    summary.failed,
                    if summary.aborted { " (aborted: not logged in)" } else { "" }
                );
            }
            report.exit_code()
        }
        Err(err) => {
            engine_error!("Worker failed: {err:#}");
            EXIT_FAILURE
        }
    }
}

fn list_sites(config: Option<&Path>) -> u8 {
    let config = match AppConfig::load(config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("convo: {err:#}");
            return EXIT_FAILURE;
        }
    };
    for profile in config.profiles() {
        println!("{:<12} {}", profile.name, profile.home_url);
    }
    0
}
