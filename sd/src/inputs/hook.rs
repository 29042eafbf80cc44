//! Hook source - one task per emission of a named event

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::{InputSource, TaskCallback};
use crate::domain::{Task, TaskMetadata};
use crate::events::{EventChannel, SubscriptionId};
use crate::schedule::HookConfig;

/// Replaced by the JSON rendering of the event payload
pub const PAYLOAD_PLACEHOLDER: &str = "{{payload}}";

/// Substitute the first `{{payload}}` with the payload's compact JSON, or "" without one
pub fn render_prompt(template: &str, payload: Option<&Value>) -> String {
    let rendered = payload.map(Value::to_string).unwrap_or_default();
    template.replacen(PAYLOAD_PLACEHOLDER, &rendered, 1)
}

/// Subscribes to one event name on an [`EventChannel`]
pub struct HookInput {
    id: String,
    config: HookConfig,
    channel: Arc<dyn EventChannel>,
    subscription: Option<SubscriptionId>,
}

impl HookInput {
    /// Id defaults to `hook-<event-name>`
    pub fn new(config: HookConfig, channel: Arc<dyn EventChannel>) -> Self {
        let id = format!("hook-{}", config.event_name);
        Self::with_id(config, channel, id)
    }

    pub fn with_id(config: HookConfig, channel: Arc<dyn EventChannel>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config,
            channel,
            subscription: None,
        }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }
}

impl InputSource for HookInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn source_type(&self) -> &'static str {
        "hook"
    }

    fn start(&mut self, agent_name: &str, on_task: TaskCallback) {
        if self.subscription.is_some() {
            debug!(id = %self.id, "HookInput::start: already active");
            return;
        }

        let agent_name = agent_name.to_string();
        let config = self.config.clone();
        let source = format!("hook:{}", config.event_name);

        let handler = Arc::new(move |payload: Option<&Value>| {
            let mut task = Task::new(
                &agent_name,
                render_prompt(&config.prompt, payload),
                config.priority.unwrap_or_default(),
                &source,
            );
            if let Some(payload) = payload {
                let mut metadata = TaskMetadata::new();
                metadata.insert("payload".to_string(), payload.clone());
                task = task.with_metadata(metadata);
            }
            on_task(task);
        });

        self.subscription = Some(self.channel.subscribe(&self.config.event_name, handler));
        info!(id = %self.id, event_name = %self.config.event_name, "HookInput started");
    }

    fn stop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        self.channel.unsubscribe(&self.config.event_name, subscription);
        info!(id = %self.id, "HookInput stopped");
    }

    fn is_active(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for HookInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::events::LocalEmitter;
    use serde_json::json;
    use std::sync::Mutex;

    fn hook(event_name: &str, prompt: &str) -> HookConfig {
        HookConfig {
            event_name: event_name.to_string(),
            prompt: prompt.to_string(),
            priority: None,
        }
    }

    fn started(emitter: &Arc<LocalEmitter>, config: HookConfig) -> (HookInput, Arc<Mutex<Vec<Task>>>) {
        let tasks = Arc::new(Mutex::new(Vec::new()));
        let t = Arc::clone(&tasks);
        let mut input = HookInput::new(config, emitter.clone());
        input.start("agent-a", Arc::new(move |task| t.lock().unwrap().push(task)));
        (input, tasks)
    }

    #[test]
    fn test_render_prompt() {
        assert_eq!(
            render_prompt("Process: {{payload}}", Some(&json!({"id": 42}))),
            r#"Process: {"id":42}"#
        );
        assert_eq!(render_prompt("Process: {{payload}}", None), "Process: ");
        assert_eq!(render_prompt("no placeholder", Some(&json!(1))), "no placeholder");
        assert_eq!(render_prompt("{{payload}} {{payload}}", Some(&json!("x"))), r#""x" {{payload}}"#);
    }

    #[test]
    fn test_emit_with_payload_creates_task() {
        let emitter = Arc::new(LocalEmitter::new());
        let (_input, tasks) = started(&emitter, hook("data-received", "Process: {{payload}}"));

        emitter.emit("data-received", Some(&json!({"id": 42})));

        let tasks = tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.prompt, r#"Process: {"id":42}"#);
        assert_eq!(task.source, "hook:data-received");
        assert_eq!(task.priority, Priority::Normal);
        assert_eq!(task.metadata.as_ref().unwrap()["payload"], json!({"id": 42}));
    }

    #[test]
    fn test_emit_without_payload_has_no_metadata() {
        let emitter = Arc::new(LocalEmitter::new());
        let (_input, tasks) = started(&emitter, hook("ping", "Ping {{payload}}"));

        emitter.emit("ping", None);

        let tasks = tasks.lock().unwrap();
        assert_eq!(tasks[0].prompt, "Ping ");
        assert!(tasks[0].metadata.is_none());
    }

    #[test]
    fn test_other_events_are_ignored() {
        let emitter = Arc::new(LocalEmitter::new());
        let (_input, tasks) = started(&emitter, hook("on-push", "push"));

        emitter.emit("on-merge", None);
        assert!(tasks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_unsubscribes() {
        let emitter = Arc::new(LocalEmitter::new());
        let (mut input, tasks) = started(&emitter, hook("on-push", "push"));
        assert!(input.is_active());
        assert_eq!(emitter.listener_count("on-push"), 1);

        input.stop();
        assert!(!input.is_active());
        assert_eq!(emitter.listener_count("on-push"), 0);

        emitter.emit("on-push", None);
        assert!(tasks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_id_derives_from_event_name() {
        let emitter = Arc::new(LocalEmitter::new());
        let input = HookInput::new(hook("on-push", "push"), emitter);
        assert_eq!(input.id(), "hook-on-push");
        assert_eq!(input.source_type(), "hook");
    }

    #[test]
    fn test_explicit_id() {
        let emitter = Arc::new(LocalEmitter::new());
        let input = HookInput::with_id(hook("on-push", "push"), emitter, "push-reviewer");
        assert_eq!(input.id(), "push-reviewer");
    }

    #[test]
    fn test_drop_releases_subscription() {
        let emitter = Arc::new(LocalEmitter::new());
        {
            let (_input, _tasks) = started(&emitter, hook("on-push", "push"));
            assert_eq!(emitter.listener_count("on-push"), 1);
        }
        assert_eq!(emitter.listener_count("on-push"), 0);
    }
}
