use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use convo_core::ShardPlan;
use engine_logging::{engine_error, engine_info, engine_warn};

use crate::cli::RunArgs;
use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub shard: ShardPlan,
    pub args: Vec<OsString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// `code` is `None` when the child was killed by a signal.
    Finished { shard: ShardPlan, code: Option<i32> },
    SpawnFailed { shard: ShardPlan, message: String },
}

impl WorkerExit {
    pub fn shard(&self) -> ShardPlan {
        match self {
            WorkerExit::Finished { shard, .. } | WorkerExit::SpawnFailed { shard, .. } => *shard,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, WorkerExit::Finished { code: Some(0), .. })
    }
}

#[derive(Debug, Default)]
pub struct PoolReport {
    /// Ordered by shard index.
    pub exits: Vec<WorkerExit>,
}

impl PoolReport {
    pub fn exit_code(&self) -> u8 {
        if self.exits.iter().all(WorkerExit::succeeded) {
            0
        } else {
            1
        }
    }
}

/// Child processes of the same executable, one per shard. Each child gets a waiter thread
/// that reports its exit over a channel.
pub struct WorkerPool {
    program: PathBuf,
    stagger: Duration,
}

impl WorkerPool {
    pub fn new(program: impl Into<PathBuf>, stagger: Duration) -> Self {
        Self {
            program: program.into(),
            stagger,
        }
    }

    /// Starts the workers `stagger` apart and blocks until every one has exited.
    pub fn run(&self, specs: Vec<WorkerSpec>) -> PoolReport {
        let (exit_tx, exit_rx) = mpsc::channel();

        for (index, spec) in specs.into_iter().enumerate() {
            if index > 0 && !self.stagger.is_zero() {
                thread::sleep(self.stagger);
            }
            let shard = spec.shard;
            match Command::new(&self.program).args(&spec.args).spawn() {
                Ok(mut child) => {
                    engine_info!("Started worker for {shard} (pid {})", child.id());
                    let exit_tx = exit_tx.clone();
                    thread::spawn(move || {
                        let exit = match child.wait() {
                            Ok(status) => WorkerExit::Finished {
                                shard,
                                code: status.code(),
                            },
                            Err(err) => WorkerExit::SpawnFailed {
                                shard,
                                message: format!("wait failed: {err}"),
                            },
                        };
                        let _ = exit_tx.send(exit);
                    });
                }
                Err(err) => {
                    engine_error!("Could not start worker for {shard}: {err}");
                    let _ = exit_tx.send(WorkerExit::SpawnFailed {
                        shard,
                        message: err.to_string(),
                    });
                }
            }
        }
        drop(exit_tx);

        let mut exits = Vec::new();
        for exit in exit_rx {
            match &exit {
                WorkerExit::Finished { shard, code: Some(0) } => {
                    engine_info!("Worker for {shard} finished")
                }
                WorkerExit::Finished { shard, code } => {
                    engine_warn!("Worker for {shard} exited with {code:?}")
                }
                WorkerExit::SpawnFailed { shard, message } => {
                    engine_warn!("Worker for {shard} failed: {message}")
                }
            }
            exits.push(exit);
        }
        exits.sort_by_key(|exit| exit.shard().shard_index());
        PoolReport { exits }
    }
}

/// Master mode: no scraping, only the pool of shard workers.
pub fn run_master(args: &RunArgs, config: &AppConfig, workers: usize) -> Result<u8> {
    let shards = ShardPlan::all(workers).context("invalid worker count")?;
    let program = std::env::current_exe().context("locating the convo executable")?;
    let specs = shards
        .into_iter()
        .map(|shard| WorkerSpec {
            shard,
            args: args.worker_args(shard),
        })
        .collect();

    engine_info!("Spawning {workers} worker(s) for {}", args.site);
    let report = WorkerPool::new(program, config.stagger).run(specs);
    let failed = report.exits.iter().filter(|exit| !exit.succeeded()).count();
    if failed > 0 {
        engine_warn!("{failed} of {workers} worker(s) did not finish cleanly");
    } else {
        engine_info!("All {workers} worker(s) finished");
    }
    Ok(report.exit_code())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shell_spec(index: usize, count: usize, script: &str) -> WorkerSpec {
        WorkerSpec {
            shard: ShardPlan::new(index, count).unwrap(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn exits_are_collected_per_shard() {
        engine_logging::initialize_for_tests();
        let pool = WorkerPool::new("sh", Duration::ZERO);
        let report = pool.run(vec![
            shell_spec(0, 3, "sleep 0.2; exit 0"),
            shell_spec(1, 3, "exit 2"),
            shell_spec(2, 3, "exit 0"),
        ]);

        let codes: Vec<(usize, Option<i32>)> = report
            .exits
            .iter()
            .map(|exit| match exit {
                WorkerExit::Finished { shard, code } => (shard.shard_index(), *code),
                WorkerExit::SpawnFailed { .. } => panic!("unexpected spawn failure"),
            })
            .collect();
        assert_eq!(codes, vec![(0, Some(0)), (1, Some(2)), (2, Some(0))]);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn clean_pool_exits_zero() {
        let pool = WorkerPool::new("sh", Duration::ZERO);
        let report = pool.run(vec![shell_spec(0, 2, "exit 0"), shell_spec(1, 2, "true")]);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn unspawnable_program_fails_the_pool() {
        let pool = WorkerPool::new("/nonexistent/convo-worker", Duration::ZERO);
        let report = pool.run(vec![shell_spec(0, 1, "exit 0")]);
        assert!(matches!(report.exits[0], WorkerExit::SpawnFailed { .. }));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn stagger_spaces_out_starts() {
        let pool = WorkerPool::new("sh", Duration::from_millis(100));
        let started = std::time::Instant::now();
        pool.run(vec![shell_spec(0, 3, "true"), shell_spec(1, 3, "true"), shell_spec(2, 3, "true")]);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
