//! Task Dispatcher - polls agent queues and executes ready tasks
//!
//! Each tick visits every registered agent, dequeues at most one task per
//! agent and spawns its execution. The tick never waits on an execution, so
//! different agents run concurrently; the queue's processing flag keeps each
//! single agent serial.
//!
//! There is no retry and no execution timeout. A failed call is logged as a
//! terminal `failed` record; a call that never settles blocks only its agent.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::agent::AgentCall;
use crate::domain::{ExecutionRecord, Task};
use crate::events::{CallerMeta, EventSink, IDLE};
use crate::execlog::ExecutionLog;
use crate::queue::TaskQueue;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct DispatcherInner {
    /// Registered agents in registration order
    agents: Vec<String>,

    /// Agents that had work dispatched since they were last idle
    busy: HashSet<String>,

    /// Polling loop, present while started
    poller: Option<JoinHandle<()>>,
}

pub struct TaskDispatcher {
    queue: Arc<TaskQueue>,
    log: Arc<ExecutionLog>,
    agent: Arc<dyn AgentCall>,
    poll_interval: Duration,
    event_sink: Option<Arc<dyn EventSink>>,
    inner: Mutex<DispatcherInner>,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<TaskQueue>, log: Arc<ExecutionLog>, agent: Arc<dyn AgentCall>) -> Self {
        Self {
            queue,
            log,
            agent,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_sink: None,
            inner: Mutex::new(DispatcherInner::default()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Emit `idle` notifications to this sink
    pub fn with_event_sink(mut self, sink: Option<Arc<dyn EventSink>>) -> Self {
        self.event_sink = sink;
        self
    }

    fn lock(&self) -> MutexGuard<'_, DispatcherInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn register_agent(&self, agent_name: &str) {
        debug!(%agent_name, "TaskDispatcher::register_agent: called");
        let mut inner = self.lock();
        if !inner.agents.iter().any(|a| a == agent_name) {
            inner.agents.push(agent_name.to_string());
        }
    }

    /// Forget an agent and purge its pending tasks
    ///
    /// The processing flag stays with any in-flight execution, which clears
    /// it when it settles.
    pub fn unregister_agent(&self, agent_name: &str) {
        debug!(%agent_name, "TaskDispatcher::unregister_agent: called");
        {
            let mut inner = self.lock();
            inner.agents.retain(|a| a != agent_name);
            inner.busy.remove(agent_name);
        }
        self.queue.clear_pending(agent_name);
    }

    pub fn agents(&self) -> Vec<String> {
        self.lock().agents.clone()
    }

    /// Start the polling loop; no-op when already running
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.poller.is_some() {
            debug!("TaskDispatcher::start: already running");
            return;
        }

        let period = self.poll_interval.max(Duration::from_millis(1));
        let first = Instant::now() + period;
        let dispatcher = Arc::downgrade(self);
        inner.poller = Some(tokio::spawn(poll_loop(dispatcher, first, period)));
        info!(poll_interval_ms = period.as_millis() as u64, "TaskDispatcher started");
    }

    /// Stop polling; executions already in flight keep running
    pub fn stop(&self) {
        let Some(poller) = self.lock().poller.take() else {
            return;
        };
        poller.abort();
        info!("TaskDispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock().poller.is_some()
    }

    /// One polling pass over every registered agent
    ///
    /// Returns the handles of the executions started by this pass. `idle`
    /// notifications go out after the internal lock is released.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.lock();
        let agents = inner.agents.clone();
        let mut started = Vec::new();
        let mut drained = Vec::new();

        for agent_name in &agents {
            if self.queue.is_processing(agent_name) {
                continue;
            }

            match self.queue.dequeue(agent_name) {
                Some(task) => {
                    // Flag before spawning so the next tick cannot dequeue again
                    self.queue.mark_processing(agent_name);
                    inner.busy.insert(agent_name.clone());
                    started.push(tokio::spawn(execute(
                        Arc::clone(&self.queue),
                        Arc::clone(&self.log),
                        Arc::clone(&self.agent),
                        task,
                    )));
                }
                None => {
                    if inner.busy.remove(agent_name) {
                        drained.push(agent_name.clone());
                    }
                }
            }
        }
        drop(inner);

        for agent_name in &drained {
            self.emit_idle(agent_name);
        }

        if !started.is_empty() {
            debug!(count = started.len(), "TaskDispatcher::tick: started executions");
        }
        started
    }

    fn emit_idle(&self, agent_name: &str) {
        debug!(%agent_name, "TaskDispatcher::emit_idle: called");
        if let Some(sink) = &self.event_sink {
            sink.emit(
                IDLE,
                CallerMeta::system("TaskDispatcher"),
                agent_name,
                serde_json::json!({"idleSince": Utc::now().to_rfc3339()}),
            );
        }
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        if let Some(poller) = self.lock().poller.take() {
            poller.abort();
        }
    }
}

/// Ticks at `first`, then every `period`
async fn poll_loop(dispatcher: Weak<TaskDispatcher>, first: Instant, period: Duration) {
    let mut interval = tokio::time::interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(dispatcher) = dispatcher.upgrade() else {
            return;
        };
        dispatcher.tick();
    }
}

/// Run one task to completion and record the outcome
async fn execute(queue: Arc<TaskQueue>, log: Arc<ExecutionLog>, agent: Arc<dyn AgentCall>, task: Task) {
    debug!(task_id = %task.id, agent = %task.agent_name, source = %task.source, "execute: called");
    let record = ExecutionRecord::started(&task);

    let outcome = AssertUnwindSafe(agent.prompt(&task.agent_name, &task.prompt))
        .catch_unwind()
        .await;

    let record = match outcome {
        Ok(Ok(response)) => record.complete(response),
        Ok(Err(e)) => {
            warn!(task_id = %task.id, agent = %task.agent_name, error = %e, "Task failed");
            record.fail(e.to_string())
        }
        Err(_) => {
            warn!(task_id = %task.id, agent = %task.agent_name, "Agent call panicked");
            record.fail("agent call panicked".to_string())
        }
    };

    queue.mark_done(&task.agent_name);
    log.record(record).await;
}
