//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::Priority;

/// sd - per-agent task scheduler
#[derive(Parser)]
#[command(
    name = "sd",
    about = "Schedule and dispatch prompts to long-running AI agents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the configured agents' schedules until Ctrl-C
    Run {
        /// Only run these agents (repeatable)
        #[arg(short, long = "agent", value_name = "NAME")]
        agents: Vec<String>,
    },

    /// Send one prompt to an agent and wait for the result
    Dispatch {
        /// Agent name
        agent: String,

        /// Prompt text
        prompt: String,

        /// Task priority (low, normal, high, critical)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Give up waiting after this many milliseconds
        #[arg(short, long, default_value = "60000")]
        wait_ms: u64,
    },

    /// List the input sources each agent's schedule produces
    Sources {
        /// Only this agent
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Show persisted execution records for an agent
    Logs {
        /// Agent name
        agent: String,

        /// Number of records to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Count persisted execution records by status
    Stats {
        /// Agent name
        agent: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for logs/stats commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
