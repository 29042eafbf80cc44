//! Daemon configuration types and loading
//!
//! ```yaml
//! log-level: debug
//! persist-dir: ~/.local/share/agentsched/logs
//! poll-interval-ms: 1000
//! max-in-memory: 1000
//! agent-command:
//!   program: my-agent
//!   args: ["--quiet"]
//! agents:
//!   - name: reviewer
//!     schedule:
//!       heartbeat:
//!         interval-ms: 60000
//!         prompt: "Anything to review?"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::AgentCommand;
use crate::events::EventSink;
use crate::execlog::DEFAULT_MAX_IN_MEMORY;
use crate::schedule::ScheduleConfig;
use crate::scheduler::SchedulerOptions;

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = "agentsched.yml";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Directory holding `<agent>-log.jsonl` files
    #[serde(rename = "persist-dir")]
    pub persist_dir: PathBuf,

    /// Dispatcher polling interval
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Execution records kept in memory per scheduler
    #[serde(rename = "max-in-memory")]
    pub max_in_memory: usize,

    /// Program invoked for every task
    #[serde(rename = "agent-command")]
    pub agent_command: AgentCommand,

    pub agents: Vec<AgentConfig>,
}

/// One managed agent and its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_persist_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentsched")
        .join("logs")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            persist_dir: default_persist_dir(),
            poll_interval_ms: 1000,
            max_in_memory: DEFAULT_MAX_IN_MEMORY,
            agent_command: AgentCommand::default(),
            agents: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./agentsched.yml`, then
    /// `<config_dir>/agentsched/agentsched.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_locations() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("agentsched").join(LOCAL_CONFIG_FILE));
        }
        locations
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read just the log level, before logging is initialized
    ///
    /// Errors are ignored here; the full [`Config::load`] reports them.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_locations(),
        };
        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    /// Persist directory with a leading `~` expanded
    pub fn persist_dir(&self) -> PathBuf {
        expand_tilde(&self.persist_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Configured agents, or only the named ones (each must exist)
    ///
    /// Every selected schedule is validated before it is returned.
    pub fn select_agents(&self, names: &[String]) -> Result<Vec<&AgentConfig>> {
        let selected: Vec<&AgentConfig> = if names.is_empty() {
            self.agents.iter().collect()
        } else {
            names
                .iter()
                .map(|name| {
                    self.agent(name)
                        .ok_or_else(|| eyre::eyre!("Agent '{}' is not configured", name))
                })
                .collect::<Result<_>>()?
        };
        for agent in &selected {
            agent
                .schedule
                .validate()
                .with_context(|| format!("Invalid schedule for agent '{}'", agent.name))?;
        }
        Ok(selected)
    }

    /// Scheduler wiring derived from this configuration
    pub fn scheduler_options(&self, event_sink: Option<Arc<dyn EventSink>>) -> SchedulerOptions {
        debug!(persist_dir = ?self.persist_dir, "Config::scheduler_options: called");
        SchedulerOptions {
            persist_dir: Some(self.persist_dir()),
            event_sink,
            poll_interval: self.poll_interval(),
            max_in_memory: self.max_in_memory,
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
