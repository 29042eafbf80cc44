//! Input Router - the set of input sources feeding one agent's queue

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{InputSource, TaskCallback};
use crate::queue::TaskQueue;

/// Introspection view of a registered source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub active: bool,
}

/// Owns registered sources and wires their output into a [`TaskQueue`]
pub struct InputRouter {
    queue: Arc<TaskQueue>,
    sources: Vec<Box<dyn InputSource>>,
    agent_name: Option<String>,
}

impl InputRouter {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            sources: Vec::new(),
            agent_name: None,
        }
    }

    fn on_task(&self) -> TaskCallback {
        let queue = Arc::clone(&self.queue);
        Arc::new(move |task| queue.enqueue(task))
    }

    /// Add a source, replacing (and stopping) any source with the same id
    ///
    /// Started immediately when the router is already running.
    pub fn register(&mut self, mut source: Box<dyn InputSource>) {
        debug!(id = %source.id(), source_type = source.source_type(), "InputRouter::register: called");
        if let Some(agent_name) = &self.agent_name {
            source.start(agent_name, self.on_task());
        }

        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(index) => {
                warn!(id = %source.id(), "Replacing input source with duplicate id");
                self.sources[index].stop();
                self.sources[index] = source;
            }
            None => self.sources.push(source),
        }
    }

    /// Stop and remove a source; returns whether it existed
    pub fn unregister(&mut self, id: &str) -> bool {
        debug!(%id, "InputRouter::unregister: called");
        let Some(index) = self.sources.iter().position(|s| s.id() == id) else {
            return false;
        };
        let mut source = self.sources.remove(index);
        source.stop();
        true
    }

    /// Remember the agent and start every inactive source
    pub fn start_all(&mut self, agent_name: &str) {
        self.agent_name = Some(agent_name.to_string());
        let on_task = self.on_task();
        for source in self.sources.iter_mut().filter(|s| !s.is_active()) {
            source.start(agent_name, Arc::clone(&on_task));
        }
        info!(%agent_name, sources = self.sources.len(), "Input sources started");
    }

    /// Stop every source and forget the agent
    pub fn stop_all(&mut self) {
        for source in &mut self.sources {
            source.stop();
        }
        if let Some(agent_name) = self.agent_name.take() {
            info!(%agent_name, "Input sources stopped");
        }
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|s| SourceInfo {
                id: s.id().to_string(),
                source_type: s.source_type().to_string(),
                active: s.is_active(),
            })
            .collect()
    }

    pub fn get_source(&self, id: &str) -> Option<&dyn InputSource> {
        self.sources.iter().find(|s| s.id() == id).map(|s| s.as_ref())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Agent the router is running for, if started
    pub fn agent_name(&self) -> Option<&str> {
        self.agent_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Task};
    use crate::events::LocalEmitter;
    use crate::inputs::HookInput;
    use crate::schedule::HookConfig;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that records lifecycle calls and can push tasks on demand
    struct ManualSource {
        id: String,
        callback: Arc<Mutex<Option<(String, TaskCallback)>>>,
        stops: Arc<AtomicUsize>,
    }

    impl ManualSource {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                callback: Arc::new(Mutex::new(None)),
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl InputSource for ManualSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn source_type(&self) -> &'static str {
            "manual"
        }

        fn start(&mut self, agent_name: &str, on_task: TaskCallback) {
            *self.callback.lock().unwrap() = Some((agent_name.to_string(), on_task));
        }

        fn stop(&mut self) {
            if self.callback.lock().unwrap().take().is_some() {
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_active(&self) -> bool {
            self.callback.lock().unwrap().is_some()
        }
    }

    fn push(callback: &Arc<Mutex<Option<(String, TaskCallback)>>>, prompt: &str) {
        let guard = callback.lock().unwrap();
        let (agent, on_task) = guard.as_ref().unwrap();
        on_task(Task::new(agent, prompt, Priority::Normal, "manual"));
    }

    #[test]
    fn test_start_all_wires_sources_into_queue() {
        let queue = Arc::new(TaskQueue::new());
        let mut router = InputRouter::new(Arc::clone(&queue));
        let source = ManualSource::new("m1");
        let callback = Arc::clone(&source.callback);
        router.register(Box::new(source));

        router.start_all("agent-a");
        push(&callback, "hello");

        assert_eq!(queue.queue_size("agent-a"), 1);
        assert_eq!(router.agent_name(), Some("agent-a"));
    }

    #[test]
    fn test_register_while_running_starts_source() {
        let queue = Arc::new(TaskQueue::new());
        let mut router = InputRouter::new(Arc::clone(&queue));
        router.start_all("agent-a");

        router.register(Box::new(ManualSource::new("late")));
        assert!(router.get_source("late").unwrap().is_active());
    }

    #[test]
    fn test_duplicate_id_replaces_and_stops_old() {
        let queue = Arc::new(TaskQueue::new());
        let mut router = InputRouter::new(queue);
        let first = ManualSource::new("dup");
        let first_stops = Arc::clone(&first.stops);
        router.register(Box::new(first));
        router.start_all("agent-a");

        router.register(Box::new(ManualSource::new("dup")));

        assert_eq!(router.source_count(), 1);
        assert_eq!(first_stops.load(Ordering::SeqCst), 1);
        assert!(router.get_source("dup").unwrap().is_active());
    }

    #[test]
    fn test_unregister() {
        let queue = Arc::new(TaskQueue::new());
        let mut router = InputRouter::new(queue);
        let source = ManualSource::new("m1");
        let stops = Arc::clone(&source.stops);
        router.register(Box::new(source));
        router.start_all("agent-a");

        assert!(router.unregister("m1"));
        assert!(!router.unregister("m1"));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(router.source_count(), 0);
    }

    #[test]
    fn test_stop_all_stops_and_forgets_agent() {
        let queue = Arc::new(TaskQueue::new());
        let mut router = InputRouter::new(queue);
        router.register(Box::new(ManualSource::new("m1")));
        router.register(Box::new(ManualSource::new("m2")));
        router.start_all("agent-a");

        router.stop_all();

        assert!(router.list_sources().iter().all(|s| !s.active));
        assert_eq!(router.agent_name(), None);

        // Registering after stop does not auto-start
        router.register(Box::new(ManualSource::new("m3")));
        assert!(!router.get_source("m3").unwrap().is_active());
    }

    #[test]
    fn test_list_sources_with_hook() {
        let queue = Arc::new(TaskQueue::new());
        let emitter = Arc::new(LocalEmitter::new());
        let mut router = InputRouter::new(Arc::clone(&queue));
        router.register(Box::new(HookInput::new(
            HookConfig {
                event_name: "on-push".to_string(),
                prompt: "push {{payload}}".to_string(),
                priority: Some(Priority::High),
            },
            emitter.clone(),
        )));

        let listed = router.list_sources();
        assert_eq!(
            listed,
            vec![SourceInfo {
                id: "hook-on-push".to_string(),
                source_type: "hook".to_string(),
                active: false,
            }]
        );

        router.start_all("agent-a");
        emitter.emit("on-push", Some(&serde_json::json!(7)));
        let queued = queue.peek("agent-a");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].prompt, "push 7");
        assert_eq!(queued[0].priority, Priority::High);
    }

    #[test]
    fn test_two_hooks_on_one_event_with_distinct_ids() {
        let queue = Arc::new(TaskQueue::new());
        let emitter = Arc::new(LocalEmitter::new());
        let mut router = InputRouter::new(Arc::clone(&queue));
        for (id, prompt) in [("push-review", "review {{payload}}"), ("push-notify", "notify {{payload}}")] {
            let config = HookConfig {
                event_name: "on-push".to_string(),
                prompt: prompt.to_string(),
                priority: None,
            };
            router.register(Box::new(HookInput::with_id(config, emitter.clone(), id)));
        }
        assert_eq!(router.source_count(), 2);

        router.start_all("agent-a");
        emitter.emit("on-push", Some(&serde_json::json!("main")));

        let prompts: Vec<_> = queue.peek("agent-a").into_iter().map(|t| t.prompt).collect();
        assert_eq!(prompts.len(), 2);
        assert!(prompts.contains(&r#"review "main""#.to_string()));
        assert!(prompts.contains(&r#"notify "main""#.to_string()));
    }

    #[test]
    fn test_source_info_serializes_type_key() {
        let info = SourceInfo {
            id: "cron-1".to_string(),
            source_type: "cron".to_string(),
            active: true,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "cron");
    }
}
