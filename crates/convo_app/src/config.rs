use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use convo_core::ShardPlan;
use convo_engine::{builtin_profiles, ConversationSettings, RunnerSettings, SiteProfile, WebDriverSettings};
use engine_logging::engine_info;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// Everything a run needs besides the command line. Loaded from an optional RON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Saved cookies and local storage, one pair of files per site.
    pub profile_dir: PathBuf,
    pub log_dir: PathBuf,
    pub webdriver: WebDriverSettings,
    /// Per-worker WebDriver endpoints; worker `i` uses entry `i % len`.
    pub worker_endpoints: Vec<String>,
    /// Delay between spawning consecutive workers.
    pub stagger: Duration,
    pub conversation: ConversationSettings,
    pub runner: RunnerSettings,
    /// Extra sites, or replacements for built-in profiles of the same name.
    pub sites: Vec<SiteProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("outputs"),
            profile_dir: PathBuf::from("profiles"),
            log_dir: PathBuf::from("logs"),
            webdriver: WebDriverSettings::default(),
            worker_endpoints: Vec::new(),
            stagger: Duration::from_secs(2),
            conversation: ConversationSettings::default(),
            runner: RunnerSettings::default(),
            sites: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Reads `path` when given; built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        engine_info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Command-line flags win over file values.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(dir) = &args.input_dir {
            self.input_dir = dir.clone();
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(url) = &args.webdriver_url {
            self.webdriver.endpoint = url.clone();
            self.worker_endpoints.clear();
        }
    }

    /// Built-in profiles with configured ones replacing or extending them.
    pub fn profiles(&self) -> Vec<SiteProfile> {
        let mut profiles = builtin_profiles();
        for site in &self.sites {
            match profiles
                .iter_mut()
                .find(|known| known.name.eq_ignore_ascii_case(&site.name))
            {
                Some(known) => *known = site.clone(),
                None => profiles.push(site.clone()),
            }
        }
        profiles
    }

    pub fn site_profile(&self, name: &str) -> Option<SiteProfile> {
        self.profiles()
            .into_iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(name))
    }

    /// WebDriver settings for the worker that owns `shard`.
    pub fn webdriver_for(&self, shard: ShardPlan) -> WebDriverSettings {
        let mut settings = self.webdriver.clone();
        if !self.worker_endpoints.is_empty() {
            let slot = shard.shard_index() % self.worker_endpoints.len();
            settings.endpoint = self.worker_endpoints[slot].clone();
        }
        settings
    }
}
