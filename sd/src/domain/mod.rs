//! Domain types shared by the queue, the input sources and the dispatcher

mod priority;
mod record;
mod task;

pub use priority::Priority;
pub use record::{ExecutionRecord, ExecutionStatus};
pub use task::{Task, TaskMetadata};
