//! Agent-call seam - the single bridge to the agent backend
//!
//! The dispatcher only ever sees [`AgentCall`]. Hosts plug in their own
//! backend; [`CommandAgent`] runs an external program and [`FnAgent`] adapts
//! an async closure (handy in tests and embedding).

use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable carrying the agent name into [`CommandAgent`] children
pub const AGENT_ENV_VAR: &str = "AGENTSCHED_AGENT";

/// Why an agent call did not produce a response
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to spawn agent command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("agent command exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

/// Sends one prompt to one agent and resolves with its response text
///
/// No timeout is applied by callers: an implementation that never resolves
/// blocks that agent's queue.
#[async_trait]
pub trait AgentCall: Send + Sync {
    async fn prompt(&self, agent_name: &str, prompt: &str) -> Result<String, AgentError>;
}

type BoxedAgentFn = Box<dyn Fn(String, String) -> BoxFuture<'static, Result<String, AgentError>> + Send + Sync>;

/// [`AgentCall`] backed by an async closure
pub struct FnAgent {
    call: BoxedAgentFn,
}

impl FnAgent {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, AgentError>> + Send + 'static,
    {
        Self {
            call: Box::new(move |agent, prompt| Box::pin(f(agent, prompt))),
        }
    }
}

#[async_trait]
impl AgentCall for FnAgent {
    async fn prompt(&self, agent_name: &str, prompt: &str) -> Result<String, AgentError> {
        (self.call)(agent_name.to_string(), prompt.to_string()).await
    }
}

/// External program invoked once per task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// [`AgentCall`] that runs `program args... <prompt>` and returns trimmed stdout
pub struct CommandAgent {
    command: AgentCommand,
}

impl CommandAgent {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AgentCall for CommandAgent {
    async fn prompt(&self, agent_name: &str, prompt: &str) -> Result<String, AgentError> {
        debug!(%agent_name, program = %self.command.program, "CommandAgent::prompt: called");
        let output = tokio::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(prompt)
            .envs(&self.command.env)
            .env(AGENT_ENV_VAR, agent_name)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(%agent_name, code, "CommandAgent::prompt: non-zero exit");
            return Err(AgentError::NonZeroExit { code, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
