//! Heartbeat source - one task per fixed interval

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{InputSource, TaskCallback, Trigger, generate_source_id};
use crate::domain::Task;
use crate::events::{CallerMeta, EventSink, HEARTBEAT_TICK};
use crate::schedule::HeartbeatConfig;

/// Fires once per `interval_ms`, the first fire one full interval after `start`
pub struct HeartbeatInput {
    id: String,
    config: HeartbeatConfig,
    event_sink: Option<Arc<dyn EventSink>>,
    timer: Option<Trigger>,
}

impl HeartbeatInput {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self::with_id(config, generate_source_id("heartbeat"))
    }

    pub fn with_id(config: HeartbeatConfig, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config,
            event_sink: None,
            timer: None,
        }
    }

    /// Publish `heartbeat:tick` to this sink on every fire
    pub fn with_event_sink(mut self, sink: Option<Arc<dyn EventSink>>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}

impl InputSource for HeartbeatInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn source_type(&self) -> &'static str {
        "heartbeat"
    }

    fn start(&mut self, agent_name: &str, on_task: TaskCallback) {
        if self.timer.is_some() {
            debug!(id = %self.id, "HeartbeatInput::start: already active");
            return;
        }

        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let first = Instant::now() + period;
        let source = format!("heartbeat:{}", self.id);
        let agent_name = agent_name.to_string();
        let config = self.config.clone();
        let sink = self.event_sink.clone();

        self.timer = Some(Trigger::spawn(move |gate| async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick_count: u64 = 0;

            loop {
                interval.tick().await;
                let fired = gate.pass(|| {
                    tick_count += 1;
                    if let Some(sink) = &sink {
                        sink.emit(
                            HEARTBEAT_TICK,
                            CallerMeta::system("HeartbeatInput"),
                            &agent_name,
                            serde_json::json!({"intervalMs": config.interval_ms, "tickCount": tick_count}),
                        );
                    }
                    on_task(Task::new(
                        &agent_name,
                        &config.prompt,
                        config.priority.unwrap_or_default(),
                        &source,
                    ));
                });
                if !fired {
                    return;
                }
            }
        }));

        info!(id = %self.id, interval_ms = self.config.interval_ms, "HeartbeatInput started");
    }

    fn stop(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        drop(timer);
        info!(id = %self.id, "HeartbeatInput stopped");
    }

    fn is_active(&self) -> bool {
        self.timer.is_some()
    }
}
