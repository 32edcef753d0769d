//! Logger initialization for the `convo` binary.
//!
//! Runs log to the terminal and append to `<log_dir>/<site>[-shard-i].log`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use convo_core::ShardPlan;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Destination for log output.
pub enum LogDestination {
    /// Write to the terminal only.
    Terminal,
    /// Write to the terminal and append to the given file.
    Both(PathBuf),
}

/// `deepseek.log` for an unsharded run, `deepseek-shard-2.log` for shard 2.
pub fn log_file_name(site: &str, shard: ShardPlan) -> String {
    if shard.is_sharded() {
        format!("{site}-shard-{}.log", shard.shard_index())
    } else {
        format!("{site}.log")
    }
}

pub fn run_destination(log_dir: &Path, site: &str, shard: ShardPlan) -> LogDestination {
    LogDestination::Both(log_dir.join(log_file_name(site, shard)))
}

/// Initialize the global logger. A second call is ignored.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let LogDestination::Both(path) = destination {
        if let Some(file_logger) = create_file_logger(&path, level, config) {
            loggers.push(file_logger);
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(path: &Path, level: LevelFilter, config: Config) -> Option<Box<WriteLogger<File>>> {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory {:?}: {}", parent, err);
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not open log file at {:?}: {}", path, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_workers_get_their_own_file() {
        assert_eq!(log_file_name("kimi", ShardPlan::single()), "kimi.log");
        assert_eq!(
            log_file_name("kimi", ShardPlan::new(2, 4).unwrap()),
            "kimi-shard-2.log"
        );
    }
}
