//! Input sources - independent producers of tasks
//!
//! Every source owns one trigger (a timer, a cron schedule or an event
//! subscription) and pushes synthesized tasks through the callback handed to
//! [`InputSource::start`]. The [`InputRouter`] wires that callback to the
//! agent's [`TaskQueue`](crate::queue::TaskQueue).
//!
//! Timer-backed sources spawn onto the current Tokio runtime, so `start` must
//! be called from within one.

mod cron;
mod heartbeat;
mod hook;
mod router;

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::Task;

pub use self::cron::{CronInput, normalize_cron, parse_cron_pattern, parse_timezone};
pub use heartbeat::HeartbeatInput;
pub use hook::{HookInput, PAYLOAD_PLACEHOLDER, render_prompt};
pub use router::{InputRouter, SourceInfo};

/// Receives every task a source produces
pub type TaskCallback = Arc<dyn Fn(Task) + Send + Sync>;

/// A pluggable task producer
///
/// `start` while active and `stop` while inactive are no-ops. `stop` releases
/// the trigger (timer, job, subscription) before the source reports inactive.
pub trait InputSource: Send + Sync {
    /// Stable identifier, unique within a router
    fn id(&self) -> &str;

    /// Discriminator: "heartbeat", "cron" or "hook"
    fn source_type(&self) -> &'static str;

    fn start(&mut self, agent_name: &str, on_task: TaskCallback);

    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Gate between a spawned trigger and the task callback
///
/// Once [`FireGate::close`] returns, no fire is in progress and none will
/// start, even when the trigger runs on another worker thread.
#[derive(Clone)]
pub(crate) struct FireGate(Arc<Mutex<bool>>);

impl FireGate {
    pub(crate) fn open() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    /// Run `fire` unless the gate is closed; false means the trigger should exit
    pub(crate) fn pass(&self, fire: impl FnOnce()) -> bool {
        let open = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !*open {
            return false;
        }
        fire();
        true
    }

    pub(crate) fn close(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }
}

/// A spawned timer loop; dropping it closes the gate and aborts the task
pub(crate) struct Trigger {
    gate: FireGate,
    handle: JoinHandle<()>,
}

impl Trigger {
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(FireGate) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let gate = FireGate::open();
        let handle = tokio::spawn(body(gate.clone()));
        Self { gate, handle }
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.gate.close();
        self.handle.abort();
    }
}

/// `<prefix>-<8 hex chars>` identifier for sources created without an explicit id
pub(crate) fn generate_source_id(prefix: &str) -> String {
    let simple = Uuid::now_v7().simple().to_string();
    // The leading chars of a v7 uuid are the timestamp; take from the random tail
    format!("{prefix}-{}", &simple[simple.len() - 8..])
}
