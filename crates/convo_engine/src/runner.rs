use std::collections::HashSet;
use std::path::PathBuf;
use std::slice;
use std::time::Duration;

use convo_core::{
    pending_prompts, BreakerState, CircuitBreaker, DonePolicy, ResponseRecord, RetryPolicy,
    ShardPlan,
};
use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::EngineError;
use crate::ledger::{read_done_set, Ledger, LedgerError, OutputNaming};
use crate::persist::ensure_output_dir;
use crate::retry::retry_with_backoff;
use crate::transcript::Transcript;

const PROMPT_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: String,
    pub site: String,
}

/// Turns one prompt into a record. `Err` values that abort the task stop the runner;
/// any other `Err` counts as a failed attempt.
#[async_trait::async_trait]
pub trait PromptExecutor: Send {
    async fn prepare(&mut self, task: &TaskContext) -> Result<(), EngineError>;

    async fn execute(&mut self, task: &TaskContext, prompt: &str) -> Result<ResponseRecord, EngineError>;

    async fn finish(&mut self, _task: &TaskContext) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub retry: RetryPolicy,
    pub done_policy: DonePolicy,
    pub breaker_threshold: u32,
    pub cooldown: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            done_policy: DonePolicy::default(),
            breaker_threshold: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlan {
    pub task_id: String,
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub task_id: String,
    pub total: usize,
    pub already_done: usize,
    pub assigned: usize,
    pub persisted: usize,
    pub failed: usize,
    /// The session was not authenticated; remaining prompts were left for a later run.
    pub aborted: bool,
}

struct PromptAttempt<'a, E: ?Sized> {
    executor: &'a mut E,
    task: &'a TaskContext,
    prompt: &'a str,
}

/// Runs the tasks of one worker: resume from the ledger, shard, retry, persist.
pub struct TaskRunner {
    site: String,
    output_dir: PathBuf,
    shard: ShardPlan,
    settings: RunnerSettings,
    breaker: CircuitBreaker,
}

impl TaskRunner {
    pub fn new(
        site: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        shard: ShardPlan,
        settings: RunnerSettings,
    ) -> Self {
        let breaker = CircuitBreaker::new(settings.breaker_threshold);
        Self {
            site: site.into(),
            output_dir: output_dir.into(),
            shard,
            settings,
            breaker,
        }
    }

    pub fn naming(&self, task_id: &str) -> OutputNaming {
        OutputNaming::new(self.site.clone(), task_id, self.shard)
    }

    pub async fn run_task<E>(&mut self, executor: &mut E, plan: &TaskPlan) -> Result<TaskSummary, EngineError>
    where
        E: PromptExecutor + ?Sized,
    {
        let policy = self.settings.done_policy;
        let naming = self.naming(&plan.task_id);
        ensure_output_dir(&self.output_dir).map_err(LedgerError::from)?;
        let ledger = Ledger::new(self.output_dir.join(naming.ledger_file_name()), policy);
        let transcript = Transcript::new(self.output_dir.join(naming.transcript_file_name()));

        let loaded = ledger.load()?;
        let mut done = loaded.done;
        for sibling in naming.sibling_ledgers(&self.output_dir)? {
            done.extend(read_done_set(&sibling, policy)?);
        }

        let pending = pending_prompts(&plan.prompts, &done);
        let assigned = self.shard.select(&pending);
        let distinct = pending_prompts(&plan.prompts, &HashSet::new()).len();
        let mut summary = TaskSummary {
            task_id: plan.task_id.clone(),
            total: plan.prompts.len(),
            already_done: distinct - pending.len(),
            assigned: assigned.len(),
            ..TaskSummary::default()
        };
        engine_info!(
            "Task {}: {} prompts, {} already done, {} assigned to {}",
            plan.task_id,
            summary.total,
            summary.already_done,
            summary.assigned,
            self.shard
        );
        if assigned.is_empty() {
            return Ok(summary);
        }

        let task = TaskContext {
            task_id: plan.task_id.clone(),
            site: self.site.clone(),
        };
        if let Err(err) = executor.prepare(&task).await {
            if err.aborts_task() {
                engine_warn!("Task {} aborted: {err}", plan.task_id);
                summary.aborted = true;
                return Ok(summary);
            }
            engine_warn!("Task {} preparation failed, continuing: {err}", plan.task_id);
        }

        for (index, prompt) in assigned.iter().enumerate() {
            engine_info!(
                "[{}/{}] {}",
                index + 1,
                assigned.len(),
                preview(prompt)
            );
            let mut attempt = PromptAttempt {
                executor: &mut *executor,
                task: &task,
                prompt: prompt.as_str(),
            };
            let outcome = retry_with_backoff(
                &self.settings.retry,
                &mut attempt,
                "prompt",
                |job, _attempt| {
                    Box::pin(async move { job.executor.execute(job.task, job.prompt).await })
                },
                |result| match result {
                    Ok(record) => policy.is_done_record(record),
                    Err(err) => err.aborts_task(),
                },
            )
            .await;

            match outcome.value {
                Err(err) if err.aborts_task() => {
                    engine_warn!("Task {} aborted: {err}", plan.task_id);
                    summary.aborted = true;
                    break;
                }
                Ok(record) if outcome.succeeded => {
                    ledger.append(slice::from_ref(&record))?;
                    transcript.append(slice::from_ref(&record))?;
                    summary.persisted += 1;
                    self.breaker.record_success();
                }
                last => {
                    let reason = match &last {
                        Ok(record) if record.error_message.is_empty() => record.status.to_string(),
                        Ok(record) => format!("{}: {}", record.status, record.error_message),
                        Err(err) => err.to_string(),
                    };
                    engine_warn!(
                        "Prompt not done after {} attempts ({reason}); left for a later run",
                        outcome.attempts
                    );
                    summary.failed += 1;
                    if self.breaker.record_failure() == BreakerState::Tripped {
                        engine_warn!(
                            "{} consecutive failures; cooling down for {:?}",
                            self.settings.breaker_threshold,
                            self.settings.cooldown
                        );
                        sleep(self.settings.cooldown).await;
                    }
                }
            }
        }

        executor.finish(&task).await;
        engine_info!(
            "Task {} finished: persisted {}, failed {}{}",
            summary.task_id,
            summary.persisted,
            summary.failed,
            if summary.aborted { ", aborted" } else { "" }
        );
        Ok(summary)
    }
}

fn preview(prompt: &str) -> String {
    let mut out: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
