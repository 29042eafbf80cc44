//! Agent Scheduler - composition root, one per managed agent
//!
//! ```text
//!   ScheduleConfig ──configure──▶ InputRouter ──enqueue──▶ TaskQueue
//!                                 (heartbeat,               │
//!                                  cron, hooks)             ▼
//!   dispatch() ─────────────────────────────────────▶ TaskDispatcher ──▶ AgentCall
//!                                                           │
//!                                                           ▼
//!                                                     ExecutionLog
//! ```
//!
//! Every scheduler owns its own queue, log, router and dispatcher; nothing is
//! shared between agents.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::AgentCall;
use crate::dispatcher::{DEFAULT_POLL_INTERVAL, TaskDispatcher};
use crate::domain::{ExecutionRecord, ExecutionStatus, Priority, Task};
use crate::events::{EventChannel, EventSink, LocalEmitter};
use crate::execlog::{DEFAULT_MAX_IN_MEMORY, DEFAULT_RECORD_LIMIT, ExecutionLog};
use crate::inputs::{CronInput, HeartbeatInput, HookInput, InputRouter, InputSource, SourceInfo};
use crate::queue::TaskQueue;
use crate::schedule::{ScheduleConfig, ScheduleError};

/// Source tag of tasks injected through [`AgentScheduler::dispatch`]
pub const MANUAL_SOURCE: &str = "manual";

/// Optional wiring for an [`AgentScheduler`]
#[derive(Clone)]
pub struct SchedulerOptions {
    /// Mirror execution records to `<dir>/<agent>-log.jsonl`
    pub persist_dir: Option<PathBuf>,

    /// External bus for heartbeat, cron and idle notifications
    pub event_sink: Option<Arc<dyn EventSink>>,

    pub poll_interval: Duration,

    pub max_in_memory: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            persist_dir: None,
            event_sink: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_in_memory: DEFAULT_MAX_IN_MEMORY,
        }
    }
}

/// Queue state of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub queued: usize,
    pub processing: bool,
    pub tasks: Vec<Task>,
}

pub struct AgentScheduler {
    agent_name: String,
    queue: Arc<TaskQueue>,
    log: Arc<ExecutionLog>,
    router: Mutex<InputRouter>,
    dispatcher: Arc<TaskDispatcher>,
    emitter: Arc<LocalEmitter>,
    event_sink: Option<Arc<dyn EventSink>>,
    running: AtomicBool,
}

impl AgentScheduler {
    pub fn new(agent_name: impl Into<String>, agent: Arc<dyn AgentCall>, options: SchedulerOptions) -> Self {
        let agent_name = agent_name.into();
        debug!(%agent_name, persist_dir = ?options.persist_dir, "AgentScheduler::new: called");

        let queue = Arc::new(TaskQueue::new());
        let log = Arc::new(ExecutionLog::new());
        log.set_max_in_memory(options.max_in_memory);
        if let Some(dir) = &options.persist_dir {
            log.set_persist_dir(dir);
        }

        let dispatcher = TaskDispatcher::new(Arc::clone(&queue), Arc::clone(&log), agent)
            .with_poll_interval(options.poll_interval)
            .with_event_sink(options.event_sink.clone());

        Self {
            router: Mutex::new(InputRouter::new(Arc::clone(&queue))),
            agent_name,
            queue,
            log,
            dispatcher: Arc::new(dispatcher),
            emitter: Arc::new(LocalEmitter::new()),
            event_sink: options.event_sink,
            running: AtomicBool::new(false),
        }
    }

    fn router(&self) -> MutexGuard<'_, InputRouter> {
        self.router.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Materialize input sources from a schedule
    ///
    /// Cron patterns and timezones are parsed first; on error nothing is registered.
    pub fn configure(&self, config: &ScheduleConfig) -> Result<(), ScheduleError> {
        debug!(agent = %self.agent_name, sources = config.source_count(), "AgentScheduler::configure: called");
        let mut sources: Vec<Box<dyn InputSource>> = Vec::with_capacity(config.source_count());

        if let Some(heartbeat) = &config.heartbeat {
            sources.push(Box::new(
                HeartbeatInput::new(heartbeat.clone()).with_event_sink(self.event_sink.clone()),
            ));
        }
        for entry in &config.cron {
            sources.push(Box::new(
                CronInput::new(entry.clone())?.with_event_sink(self.event_sink.clone()),
            ));
        }
        for hook in &config.hooks {
            let channel: Arc<dyn EventChannel> = self.emitter.clone();
            sources.push(Box::new(HookInput::new(hook.clone(), channel)));
        }

        let mut router = self.router();
        for source in sources {
            router.register(source);
        }
        info!(agent = %self.agent_name, sources = router.source_count(), "Scheduler configured");
        Ok(())
    }

    /// Register with the dispatcher, start sources, start polling
    ///
    /// Must be called within a Tokio runtime. No-op when already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(agent = %self.agent_name, "AgentScheduler::start: already running");
            return;
        }
        self.dispatcher.register_agent(&self.agent_name);
        self.router().start_all(&self.agent_name);
        self.dispatcher.start();
        info!(agent = %self.agent_name, "Scheduler started");
    }

    /// Stop sources, stop polling, unregister (purging pending tasks)
    ///
    /// An in-flight execution is not awaited.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.router().stop_all();
        self.dispatcher.stop();
        self.dispatcher.unregister_agent(&self.agent_name);
        info!(agent = %self.agent_name, "Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a one-off task at normal priority
    pub fn dispatch(&self, prompt: impl Into<String>) -> Task {
        self.dispatch_with_priority(prompt, Priority::default())
    }

    /// Queue a one-off task, bypassing every input source
    pub fn dispatch_with_priority(&self, prompt: impl Into<String>, priority: Priority) -> Task {
        let task = Task::new(&self.agent_name, prompt, priority, MANUAL_SOURCE);
        debug!(agent = %self.agent_name, task_id = %task.id, %priority, "AgentScheduler::dispatch: called");
        self.queue.enqueue(task.clone());
        task
    }

    /// Fan an event out to this scheduler's hook sources
    ///
    /// Returns whether any hook was listening.
    pub fn emit_event(&self, event_name: &str, payload: Option<&Value>) -> bool {
        debug!(agent = %self.agent_name, %event_name, "AgentScheduler::emit_event: called");
        self.emitter.emit(event_name, payload)
    }

    pub fn get_tasks(&self) -> TaskSnapshot {
        TaskSnapshot {
            queued: self.queue.queue_size(&self.agent_name),
            processing: self.queue.is_processing(&self.agent_name),
            tasks: self.queue.peek(&self.agent_name),
        }
    }

    /// Most recent records for this agent, oldest first; 50 when `limit` is `None`
    pub fn get_logs(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        self.log
            .get_records(Some(&self.agent_name), limit.unwrap_or(DEFAULT_RECORD_LIMIT))
    }

    pub fn get_last_record(&self) -> Option<ExecutionRecord> {
        self.log.get_last_record(&self.agent_name)
    }

    pub fn get_stats(&self) -> BTreeMap<ExecutionStatus, usize> {
        self.log.get_stats(Some(&self.agent_name))
    }

    pub fn get_sources(&self) -> Vec<SourceInfo> {
        self.router().list_sources()
    }

    pub fn execution_log(&self) -> &Arc<ExecutionLog> {
        &self.log
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }
}
