use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use convo_core::{DonePolicy, ResponseRecord, ShardPlan};
use engine_logging::{engine_info, engine_warn};
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

const LEDGER_EXTENSION: &str = "ndjson";
const TRANSCRIPT_EXTENSION: &str = "md";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger rewrite failed: {0}")]
    Persist(#[from] PersistError),
    #[error("ledger serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LedgerError {
    fn io(path: &Path, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Output file names for one (site, task, shard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    site: String,
    task: String,
    shard: ShardPlan,
}

impl OutputNaming {
    pub fn new(site: impl Into<String>, task: impl Into<String>, shard: ShardPlan) -> Self {
        Self {
            site: site.into(),
            task: task.into(),
            shard,
        }
    }

    fn base(&self) -> String {
        format!("{}_conversations_{}", self.site, self.task)
    }

    fn stem(&self) -> String {
        if self.shard.is_sharded() {
            format!(
                "{}.shard-{}-of-{}",
                self.base(),
                self.shard.shard_index(),
                self.shard.shard_count()
            )
        } else {
            self.base()
        }
    }

    pub fn ledger_file_name(&self) -> String {
        format!("{}.{LEDGER_EXTENSION}", self.stem())
    }

    pub fn transcript_file_name(&self) -> String {
        format!("{}.{TRANSCRIPT_EXTENSION}", self.stem())
    }

    /// Any ledger of the same task: the unsharded file or a shard file of any split.
    pub fn is_task_ledger(&self, file_name: &str) -> bool {
        let base = self.base();
        let Some(rest) = file_name.strip_prefix(&base) else {
            return false;
        };
        let Some(middle) = rest.strip_suffix(&format!(".{LEDGER_EXTENSION}")) else {
            return false;
        };
        middle.is_empty() || middle.starts_with(".shard-")
    }

    /// Ledgers of the same task written by other shards or by earlier unsharded runs.
    pub fn sibling_ledgers(&self, dir: &Path) -> Result<Vec<PathBuf>, LedgerError> {
        let own = self.ledger_file_name();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(LedgerError::io(dir, err)),
        };
        let mut siblings = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| LedgerError::io(dir, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != own && self.is_task_ledger(&name) {
                siblings.push(entry.path());
            }
        }
        siblings.sort();
        Ok(siblings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerLoad {
    /// Trimmed prompt text of every done record.
    pub done: HashSet<String>,
    pub kept: usize,
    pub pruned: usize,
    pub malformed: usize,
}

/// Append-only NDJSON record of prompt outcomes for one task shard.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    policy: DonePolicy,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>, policy: DonePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the ledger and rewrites it to hold only done records.
    pub fn load(&self) -> Result<LedgerLoad, LedgerError> {
        let Some(scan) = scan(&self.path, self.policy)? else {
            return Ok(LedgerLoad::default());
        };

        if scan.pruned > 0 || scan.malformed > 0 {
            let mut content = String::new();
            for line in &scan.kept_lines {
                content.push_str(line);
                content.push('\n');
            }
            let file_name = self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            AtomicFileWriter::beside(&self.path).write(&file_name, &content)?;
            engine_info!(
                "Pruned {} non-done and {} malformed records from {}",
                scan.pruned,
                scan.malformed,
                self.path.display()
            );
        }

        Ok(LedgerLoad {
            done: scan.done,
            kept: scan.kept_lines.len(),
            pruned: scan.pruned,
            malformed: scan.malformed,
        })
    }

    /// One line per record, each flushed and synced before the next.
    pub fn append(&self, records: &[ResponseRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| LedgerError::io(&self.path, err))?;
        for record in records {
            let mut line = serde_json::to_string(record)?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .and_then(|()| file.flush())
                .and_then(|()| file.sync_data())
                .map_err(|err| LedgerError::io(&self.path, err))?;
        }
        Ok(())
    }
}

/// Done set of a ledger without rewriting it.
pub fn read_done_set(path: &Path, policy: DonePolicy) -> Result<HashSet<String>, LedgerError> {
    Ok(scan(path, policy)?.map(|scan| scan.done).unwrap_or_default())
}

struct Scan {
    done: HashSet<String>,
    kept_lines: Vec<String>,
    pruned: usize,
    malformed: usize,
}

fn scan(path: &Path, policy: DonePolicy) -> Result<Option<Scan>, LedgerError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(LedgerError::io(path, err)),
    };

    let mut scan = Scan {
        done: HashSet::new(),
        kept_lines: Vec::new(),
        pruned: 0,
        malformed: 0,
    };
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ResponseRecord>(line) {
            Ok(record) if policy.is_done_record(&record) => {
                let key = record.prompt_key();
                if !key.is_empty() {
                    scan.done.insert(key.to_string());
                }
                scan.kept_lines.push(line.to_string());
            }
            Ok(_) => scan.pruned += 1,
            Err(err) => {
                engine_warn!(
                    "Skipping malformed ledger line {} in {}: {err}",
                    number + 1,
                    path.display()
                );
                scan.malformed += 1;
            }
        }
    }
    Ok(Some(scan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_suffix_only_when_split() {
        let single = OutputNaming::new("kimi", "train", ShardPlan::single());
        assert_eq!(single.ledger_file_name(), "kimi_conversations_train.ndjson");
        let sharded = OutputNaming::new("kimi", "train", ShardPlan::new(1, 4).unwrap());
        assert_eq!(
            sharded.ledger_file_name(),
            "kimi_conversations_train.shard-1-of-4.ndjson"
        );
        assert_eq!(
            sharded.transcript_file_name(),
            "kimi_conversations_train.shard-1-of-4.md"
        );
    }

    #[test]
    fn task_ledger_match_ignores_other_tasks() {
        let naming = OutputNaming::new("kimi", "train", ShardPlan::single());
        assert!(naming.is_task_ledger("kimi_conversations_train.ndjson"));
        assert!(naming.is_task_ledger("kimi_conversations_train.shard-0-of-2.ndjson"));
        assert!(!naming.is_task_ledger("kimi_conversations_training.ndjson"));
        assert!(!naming.is_task_ledger("kimi_conversations_train.md"));
    }
}
