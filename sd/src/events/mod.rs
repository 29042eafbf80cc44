//! Event plumbing around the scheduler
//!
//! Two independent mechanisms live here:
//!
//! - The external **event bus** ([`EventSink`], [`EventBus`]). Heartbeat and cron
//!   sources and the dispatcher publish structured notifications to it when one
//!   is wired in; when it is absent they skip the call.
//! - The local **pub/sub channel** ([`EventChannel`], [`LocalEmitter`]) that Hook
//!   sources subscribe to. Each scheduler owns one; it is not connected to the bus.
//!
//! ```text
//!  HeartbeatInput ──┐                         ┌── subscriber (UI, logger)
//!  CronInput ───────┼──> EventSink (EventBus) ┼── subscriber
//!  TaskDispatcher ──┘                         └── ...
//!
//!  AgentScheduler::emit_event ──> LocalEmitter ──> HookInput handlers ──> TaskQueue
//! ```

mod bus;
mod emitter;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventSink, create_event_bus};
pub use emitter::{EventChannel, EventHandler, LocalEmitter, SubscriptionId};
pub use types::{BusEvent, CallerMeta, HEARTBEAT_TICK, IDLE, cron_event_name};
