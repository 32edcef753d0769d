use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use convo_core::{ShardError, ShardPlan};

#[derive(Debug, Parser)]
#[command(name = "convo", version, about = "Resumable prompt runs against web chat UIs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send every pending prompt to a chat site and record the answers.
    Run(RunArgs),
    /// Turn a JSON-lines dataset into a prompt file.
    ExtractPrompts(ExtractArgs),
    /// List the known site profiles.
    Sites {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Site profile name, e.g. `deepseek`.
    #[arg(long)]
    pub site: String,
    /// Prompt files; when absent they are discovered in the input directory.
    #[arg(long = "input", value_name = "FILE")]
    pub inputs: Vec<PathBuf>,
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// RON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub webdriver_url: Option<String>,
    /// Run as master and spawn this many shard workers.
    #[arg(long, value_name = "N", conflicts_with_all = ["shard_index", "shard_count"])]
    pub spawn_workers: Option<NonZeroUsize>,
    #[arg(long, requires = "shard_count")]
    pub shard_index: Option<usize>,
    #[arg(long, requires = "shard_index")]
    pub shard_count: Option<usize>,
}

impl RunArgs {
    pub fn shard_plan(&self) -> Result<ShardPlan, ShardError> {
        match (self.shard_index, self.shard_count) {
            (Some(index), Some(count)) => ShardPlan::new(index, count),
            _ => Ok(ShardPlan::single()),
        }
    }

    /// Command line of a child worker that handles `shard`.
    pub fn worker_args(&self, shard: ShardPlan) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["run".into(), "--site".into(), self.site.clone().into()];
        for input in &self.inputs {
            args.push("--input".into());
            args.push(input.clone().into());
        }
        let paths = [
            ("--input-dir", &self.input_dir),
            ("--output-dir", &self.output_dir),
            ("--config", &self.config),
        ];
        for (flag, value) in paths {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.clone().into());
            }
        }
        if let Some(url) = &self.webdriver_url {
            args.push("--webdriver-url".into());
            args.push(url.clone().into());
        }
        args.push("--shard-index".into());
        args.push(shard.shard_index().to_string().into());
        args.push("--shard-count".into());
        args.push(shard.shard_count().to_string().into());
        args
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExtractArgs {
    /// JSON-lines source, one object per line.
    #[arg(long)]
    pub src: PathBuf,
    #[arg(long)]
    pub dest: PathBuf,
    /// Object field holding the prompt text.
    #[arg(long, default_value = "sentence")]
    pub field: String,
}
