use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use convo_core::{is_prompt_file_name, parse_prompts, task_name_from_path, ShardPlan};
use convo_engine::{
    ChatSession, Clock, SessionStore, SiteProfile, TaskPlan, TaskRunner, TaskSummary, UiSurface,
    WebDriverSession,
};
use engine_logging::{engine_info, engine_warn};

use crate::config::AppConfig;

const FALLBACK_PROMPT_FILE: &str = "input_prompts.txt";

/// Exit status of a worker whose tasks all ran.
pub const EXIT_OK: u8 = 0;
/// Configuration, WebDriver or ledger failure.
pub const EXIT_FAILURE: u8 = 1;
/// At least one task stopped because the site session was not logged in.
pub const EXIT_UNAUTHENTICATED: u8 = 2;

#[derive(Debug, Default)]
pub struct WorkerReport {
    pub summaries: Vec<TaskSummary>,
}

impl WorkerReport {
    pub fn exit_code(&self) -> u8 {
        if self.summaries.iter().any(|s| s.aborted) {
            EXIT_UNAUTHENTICATED
        } else {
            EXIT_OK
        }
    }
}

/// Prompt files to run: the explicit list, else `*_input_prompts.txt` in `input_dir`
/// (sorted by name), else `input_prompts.txt` there.
pub fn discover_prompt_files(inputs: &[PathBuf], input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !inputs.is_empty() {
        return Ok(inputs.to_vec());
    }
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("listing input directory {}", input_dir.display()))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", input_dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_prompt_file_name(&name) && entry.path().is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    if found.is_empty() {
        let fallback = input_dir.join(FALLBACK_PROMPT_FILE);
        if fallback.is_file() {
            found.push(fallback);
        }
    }
    if found.is_empty() {
        bail!("no prompt files found in {}", input_dir.display());
    }
    Ok(found)
}

pub fn load_task_plans(files: &[PathBuf]) -> Result<Vec<TaskPlan>> {
    let mut plans: Vec<TaskPlan> = Vec::with_capacity(files.len());
    for file in files {
        let raw = fs::read_to_string(file)
            .with_context(|| format!("reading prompts from {}", file.display()))?;
        let task_id = task_name_from_path(file);
        if plans.iter().any(|plan| plan.task_id == task_id) {
            bail!("two prompt files map to task {task_id}");
        }
        let prompts = parse_prompts(&raw);
        if prompts.is_empty() {
            engine_warn!("{} holds no prompts", file.display());
        }
        plans.push(TaskPlan { task_id, prompts });
    }
    Ok(plans)
}

fn utc_clock() -> Clock {
    Arc::new(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Runs every task of one shard on its own current-thread runtime.
pub fn run_worker(config: &AppConfig, site: &str, inputs: &[PathBuf], shard: ShardPlan) -> Result<WorkerReport> {
    let profile = config
        .site_profile(site)
        .ok_or_else(|| anyhow!("unknown site {site}; see `convo sites`"))?;
    let files = discover_prompt_files(inputs, &config.input_dir)?;
    let plans = load_task_plans(&files)?;
    engine_info!(
        "{} task(s) for {} as {}",
        plans.len(),
        profile.name,
        shard
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(run_tasks(config, profile, &plans, shard))
}

async fn run_tasks(
    config: &AppConfig,
    profile: SiteProfile,
    plans: &[TaskPlan],
    shard: ShardPlan,
) -> Result<WorkerReport> {
    let session = WebDriverSession::connect(&config.webdriver_for(shard))
        .await
        .context("opening WebDriver session")?;
    engine_info!("{shard} drives WebDriver session {}", session.session_id());
    let surface: Arc<dyn UiSurface> = Arc::new(session.clone());
    let store = SessionStore::new(&config.profile_dir, profile.name.clone());
    let mut runner = TaskRunner::new(
        profile.name.clone(),
        &config.output_dir,
        shard,
        config.runner.clone(),
    );
    let mut chat = ChatSession::new(surface, profile, config.conversation.clone(), utc_clock())
        .with_session_store(store);

    let mut report = WorkerReport::default();
    let mut failure = None;
    for plan in plans {
        match runner.run_task(&mut chat, plan).await {
            Ok(summary) => report.summaries.push(summary),
            Err(err) => {
                failure = Some(anyhow::Error::new(err).context(format!("task {}", plan.task_id)));
                break;
            }
        }
    }

    if let Err(err) = session.close().await {
        engine_warn!("WebDriver session not closed cleanly: {err}");
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn discovers_suffixed_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_input_prompts.txt"), "x\n").unwrap();
        fs::write(dir.path().join("a_input_prompts.txt"), "y\n").unwrap();
        fs::write(dir.path().join(FALLBACK_PROMPT_FILE), "z\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored\n").unwrap();

        let files = discover_prompt_files(&[], dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|f| task_name_from_path(f)).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn falls_back_to_plain_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FALLBACK_PROMPT_FILE), "z\n").unwrap();
        let files = discover_prompt_files(&[], dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join(FALLBACK_PROMPT_FILE)]);

        let empty = tempfile::tempdir().unwrap();
        assert!(discover_prompt_files(&[], empty.path()).is_err());
    }

    #[test]
    fn explicit_inputs_skip_discovery() {
        let explicit = vec![PathBuf::from("/nowhere/qa.txt")];
        let files = discover_prompt_files(&explicit, Path::new("/also/nowhere")).unwrap();
        assert_eq!(files, explicit);
    }

    #[test]
    fn task_plans_keep_file_order_and_reject_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train_input_prompts.txt");
        let qa = dir.path().join("qa.txt");
        fs::write(&train, "first\n\n second \n").unwrap();
        fs::write(&qa, "").unwrap();

        let plans = load_task_plans(&[train.clone(), qa]).unwrap();
        assert_eq!(plans[0].task_id, "train");
        assert_eq!(plans[0].prompts, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(plans[1].task_id, "qa");
        assert!(plans[1].prompts.is_empty());

        let other = dir.path().join("train.txt");
        fs::write(&other, "again\n").unwrap();
        assert!(load_task_plans(&[train, other]).is_err());
    }

    #[test]
    fn aborted_task_sets_unauthenticated_exit() {
        let mut report = WorkerReport::default();
        assert_eq!(report.exit_code(), EXIT_OK);
        report.summaries.push(TaskSummary {
            aborted: true,
            ..TaskSummary::default()
        });
        assert_eq!(report.exit_code(), EXIT_UNAUTHENTICATED);
    }
}
