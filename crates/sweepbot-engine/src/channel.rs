//! Collaborator seams toward the chat platform.
//!
//! The engine never talks to Discord directly; it sees channels through these
//! traits so the purge and scheduling logic can be exercised against mocks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Failure modes of remote message-removal calls.
///
/// Both variants are recovered inside the purge retry shell and never escape
/// a worker.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("transient API failure: {0}")]
    Transient(String),
}

/// The minimum the executor needs to know about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

/// Message operations on one resolved channel.
#[async_trait::async_trait]
pub trait ChannelOps: Send + Sync {
    /// Fetch up to `limit` of the most recent messages, newest first.
    async fn history(&self, limit: u8) -> Result<Vec<MessageRef>, PurgeError>;

    /// Remove a batch of messages in one call. Only valid for messages
    /// younger than the platform's bulk-delete age threshold.
    async fn delete_messages(&self, batch: &[MessageRef]) -> Result<(), PurgeError>;

    /// Remove a single message.
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PurgeError>;
}

/// Resolves a persisted channel id to live channel operations.
///
/// Returns `None` when the channel no longer exists or is not visible to the
/// bot; the registry keeps such tasks dormant rather than cancelling them.
#[async_trait::async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn resolve(&self, channel_id: &str) -> Option<Arc<dyn ChannelOps>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// Guild and text-channel discovery for the control surface.
#[async_trait::async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_guilds(&self) -> anyhow::Result<Vec<GuildInfo>>;
    async fn list_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelInfo>>;
    /// Current display name of a channel, used as the cached task label.
    async fn channel_name(&self, channel_id: &str) -> anyhow::Result<String>;
}
