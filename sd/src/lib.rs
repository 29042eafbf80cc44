//! agentsched - per-agent task scheduling for long-running AI agents
//!
//! Independent producers (fixed-interval heartbeats, cron schedules, named
//! event hooks) feed one priority queue per agent; a polling dispatcher hands
//! ready tasks to the agent backend, one at a time per agent but concurrently
//! across agents, and records every outcome in a bounded execution log.
//!
//! # Core Concepts
//!
//! - **Serial per agent**: an agent never has two tasks in flight
//! - **Concurrent across agents**: one dispatch tick starts every ready agent
//! - **Log and move on**: failures become `failed` records; no retry, no timeout
//! - **Best-effort persistence**: records are mirrored to `<agent>-log.jsonl`
//!
//! # Modules
//!
//! - [`domain`] - Task, priority and execution record types
//! - [`queue`] - Per-agent priority queue with a processing flag
//! - [`execlog`] - Bounded execution history and its JSONL mirror
//! - [`events`] - External event bus and the local hook channel
//! - [`inputs`] - Heartbeat, cron and hook input sources plus the router
//! - [`agent`] - The agent-call seam
//! - [`dispatcher`] - Polling dispatch loop
//! - [`schedule`] - Declarative schedule configuration
//! - [`scheduler`] - Per-agent composition root
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod events;
pub mod execlog;
pub mod inputs;
pub mod queue;
pub mod schedule;
pub mod scheduler;

// Re-export commonly used types
pub use agent::{AgentCall, AgentCommand, AgentError, CommandAgent, FnAgent};
pub use config::Config;
pub use dispatcher::TaskDispatcher;
pub use domain::{ExecutionRecord, ExecutionStatus, Priority, Task, TaskMetadata};
pub use events::{BusEvent, CallerMeta, EventBus, EventChannel, EventSink, LocalEmitter, create_event_bus};
pub use execlog::{ExecutionLog, read_execution_records};
pub use inputs::{CronInput, HeartbeatInput, HookInput, InputRouter, InputSource, SourceInfo, TaskCallback};
pub use queue::TaskQueue;
pub use schedule::{CronConfig, HeartbeatConfig, HookConfig, ScheduleConfig, ScheduleError};
pub use scheduler::{AgentScheduler, SchedulerOptions, TaskSnapshot};
