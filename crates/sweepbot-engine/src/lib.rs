//! sweepbot-engine: recurring channel-purge scheduling and execution.
//!
//! One worker per active task computes the next fire time from the task's
//! recurrence rule and timezone, sleeps until then, purges the channel, and
//! reschedules. The [`registry::TaskRegistry`] owns all tasks and their
//! workers and keeps the flat-file store in sync with every mutation.

pub mod channel;
pub mod purge;
pub mod registry;
pub mod worker;

pub use channel::{ChannelDirectory, ChannelInfo, ChannelOps, ChannelProvider, GuildInfo, MessageRef, PurgeError};
pub use purge::{purge, PurgeStats};
pub use registry::{CreateTask, TaskRegistry, TaskView};
