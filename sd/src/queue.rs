//! Per-agent priority task queue
//!
//! Each agent has its own list of pending tasks ordered by priority rank
//! (critical first), stable on ties, plus a "processing" flag that enforces
//! serial execution: while an agent is marked processing, `dequeue` yields
//! nothing for it regardless of what is queued.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::domain::Task;

/// Internal state protected by mutex
#[derive(Default)]
struct QueueInner {
    /// Pending tasks per agent, kept sorted by priority rank
    queues: HashMap<String, VecDeque<Task>>,

    /// Agents with a task currently in flight
    processing: HashSet<String>,
}

/// Per-agent task queue with a busy flag per agent
///
/// No operation fails: unknown agents behave as empty queues.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a task into its agent's queue behind every task of equal or higher priority
    pub fn enqueue(&self, task: Task) {
        debug!(task_id = %task.id, agent = %task.agent_name, priority = %task.priority, "TaskQueue::enqueue: called");
        let mut inner = self.lock();
        let queue = inner.queues.entry(task.agent_name.clone()).or_default();
        let rank = task.priority.rank();
        let position = queue.partition_point(|queued| queued.priority.rank() <= rank);
        queue.insert(position, task);
    }

    /// Remove and return the highest-priority task for an agent
    ///
    /// Returns `None` when the agent has no queue, an empty queue, or is processing.
    pub fn dequeue(&self, agent_name: &str) -> Option<Task> {
        let mut inner = self.lock();
        if inner.processing.contains(agent_name) {
            debug!(%agent_name, "TaskQueue::dequeue: agent is processing");
            return None;
        }
        let task = inner.queues.get_mut(agent_name)?.pop_front();
        debug!(%agent_name, found = task.is_some(), "TaskQueue::dequeue: called");
        task
    }

    /// Mark an agent as having a task in flight
    pub fn mark_processing(&self, agent_name: &str) {
        debug!(%agent_name, "TaskQueue::mark_processing: called");
        self.lock().processing.insert(agent_name.to_string());
    }

    /// Clear an agent's in-flight flag
    pub fn mark_done(&self, agent_name: &str) {
        debug!(%agent_name, "TaskQueue::mark_done: called");
        self.lock().processing.remove(agent_name);
    }

    pub fn is_processing(&self, agent_name: &str) -> bool {
        self.lock().processing.contains(agent_name)
    }

    pub fn has_tasks(&self, agent_name: &str) -> bool {
        self.queue_size(agent_name) > 0
    }

    pub fn queue_size(&self, agent_name: &str) -> usize {
        self.lock().queues.get(agent_name).map_or(0, VecDeque::len)
    }

    /// Snapshot of an agent's pending tasks in dequeue order
    pub fn peek(&self, agent_name: &str) -> Vec<Task> {
        self.lock()
            .queues
            .get(agent_name)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop an agent's pending tasks and its processing flag
    pub fn clear(&self, agent_name: &str) {
        debug!(%agent_name, "TaskQueue::clear: called");
        let mut inner = self.lock();
        inner.queues.remove(agent_name);
        inner.processing.remove(agent_name);
    }

    /// Drop an agent's pending tasks, leaving the processing flag to its in-flight task
    pub fn clear_pending(&self, agent_name: &str) {
        debug!(%agent_name, "TaskQueue::clear_pending: called");
        self.lock().queues.remove(agent_name);
    }

    /// Drop every agent's tasks and flags
    pub fn clear_all(&self) {
        debug!("TaskQueue::clear_all: called");
        let mut inner = self.lock();
        inner.queues.clear();
        inner.processing.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use proptest::prelude::*;

    fn task(agent: &str, prompt: &str, priority: Priority) -> Task {
        Task::new(agent, prompt, priority, "manual")
    }

    fn drain(queue: &TaskQueue, agent: &str) -> Vec<Task> {
        std::iter::from_fn(|| queue.dequeue(agent)).collect()
    }

    #[test]
    fn test_priority_ordering() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "low", Priority::Low));
        queue.enqueue(task("a", "normal", Priority::Normal));
        queue.enqueue(task("a", "critical", Priority::Critical));
        queue.enqueue(task("a", "high", Priority::High));

        let prompts: Vec<_> = drain(&queue, "a").into_iter().map(|t| t.prompt).collect();
        assert_eq!(prompts, vec!["critical", "high", "normal", "low"]);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "t1", Priority::Normal));
        queue.enqueue(task("a", "t2", Priority::Normal));
        queue.enqueue(task("a", "t3", Priority::Normal));

        let prompts: Vec<_> = drain(&queue, "a").into_iter().map(|t| t.prompt).collect();
        assert_eq!(prompts, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_processing_blocks_dequeue() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "head", Priority::Normal));
        queue.enqueue(task("a", "next", Priority::Normal));
        queue.mark_processing("a");

        assert!(queue.dequeue("a").is_none());
        assert!(queue.dequeue("a").is_none());
        assert_eq!(queue.queue_size("a"), 2);

        queue.mark_done("a");
        assert_eq!(queue.dequeue("a").unwrap().prompt, "head");
    }

    #[test]
    fn test_unknown_agent_is_empty() {
        let queue = TaskQueue::new();
        assert!(queue.dequeue("ghost").is_none());
        assert!(!queue.has_tasks("ghost"));
        assert_eq!(queue.queue_size("ghost"), 0);
        assert!(queue.peek("ghost").is_empty());
        queue.clear("ghost");
        queue.mark_done("ghost");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "one", Priority::Low));
        queue.enqueue(task("a", "two", Priority::High));

        let snapshot = queue.peek("a");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].prompt, "two");
        assert_eq!(queue.queue_size("a"), 2);
    }

    #[test]
    fn test_clear_only_touches_one_agent() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "a1", Priority::Normal));
        queue.enqueue(task("b", "b1", Priority::Normal));
        queue.mark_processing("a");
        queue.mark_processing("b");

        queue.clear("a");

        assert!(!queue.has_tasks("a"));
        assert!(!queue.is_processing("a"));
        assert!(queue.has_tasks("b"));
        assert!(queue.is_processing("b"));
    }

    #[test]
    fn test_clear_all() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "a1", Priority::Normal));
        queue.enqueue(task("b", "b1", Priority::Normal));
        queue.mark_processing("b");

        queue.clear_all();

        assert!(!queue.has_tasks("a"));
        assert!(!queue.has_tasks("b"));
        assert!(!queue.is_processing("b"));
    }

    #[test]
    fn test_clear_pending_keeps_processing_flag() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", "a1", Priority::Normal));
        queue.mark_processing("a");

        queue.clear_pending("a");

        assert!(!queue.has_tasks("a"));
        assert!(queue.is_processing("a"));
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_dequeue_respects_rank_then_insertion(priorities in prop::collection::vec(priority_strategy(), 0..40)) {
            let queue = TaskQueue::new();
            for (i, p) in priorities.iter().enumerate() {
                queue.enqueue(task("a", &i.to_string(), *p));
            }

            let drained = drain(&queue, "a");
            prop_assert_eq!(drained.len(), priorities.len());

            for pair in drained.windows(2) {
                let (first, second) = (&pair[0], &pair[1]);
                prop_assert!(first.priority.rank() <= second.priority.rank());
                if first.priority == second.priority {
                    let a: usize = first.prompt.parse().unwrap();
                    let b: usize = second.prompt.parse().unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
