//! Discord adapter for sweepbot.
//!
//! Implements the engine's channel seams over serenity: message history and
//! deletion through the REST API, channel/guild discovery for the control
//! surface, and the gateway client lifecycle.

pub mod handler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serenity::all::{GatewayIntents, Http};
use serenity::builder::GetMessages;
use serenity::http::HttpError;
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::Client;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sweepbot_engine::{
    ChannelDirectory, ChannelInfo, ChannelOps, ChannelProvider, GuildInfo, MessageRef, PurgeError,
};

/// Retry interval applied to a surfaced 429. Serenity's built-in ratelimiter
/// paces requests before we ever see one, and the error response does not
/// carry the retry-after header, so a surfaced 429 gets a flat backoff.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

fn map_api_error(err: serenity::Error) -> PurgeError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &err {
        if resp.status_code.as_u16() == 429 {
            return PurgeError::RateLimited {
                retry_after: RATE_LIMIT_BACKOFF,
            };
        }
    }
    PurgeError::Transient(err.to_string())
}

fn parse_snowflake(id: &str) -> Option<u64> {
    id.parse::<u64>().ok().filter(|&v| v != 0)
}

fn created_at(timestamp: serenity::model::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Message operations on one Discord text channel.
struct DiscordChannelOps {
    http: Arc<Http>,
    channel_id: ChannelId,
}

#[async_trait::async_trait]
impl ChannelOps for DiscordChannelOps {
    async fn history(&self, limit: u8) -> Result<Vec<MessageRef>, PurgeError> {
        let messages = self
            .channel_id
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(map_api_error)?;
        Ok(messages
            .iter()
            .map(|m| MessageRef {
                id: m.id.get(),
                created_at: created_at(m.timestamp),
            })
            .collect())
    }

    async fn delete_messages(&self, batch: &[MessageRef]) -> Result<(), PurgeError> {
        // The bulk endpoint rejects batches of one; fall through to a single
        // delete the way discord.py does.
        if let [only] = batch {
            return self.delete_message(only).await;
        }
        let ids: Vec<MessageId> = batch.iter().map(|m| MessageId::new(m.id)).collect();
        self.channel_id
            .delete_messages(&self.http, ids)
            .await
            .map_err(map_api_error)
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), PurgeError> {
        self.channel_id
            .delete_message(&self.http, MessageId::new(message.id))
            .await
            .map_err(map_api_error)
    }
}

/// Resolver and directory over the bot's REST client.
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl ChannelProvider for DiscordGateway {
    async fn resolve(&self, channel_id: &str) -> Option<Arc<dyn ChannelOps>> {
        let id = parse_snowflake(channel_id)?;
        let channel = ChannelId::new(id);
        match self.http.get_channel(channel).await {
            Ok(_) => Some(Arc::new(DiscordChannelOps {
                http: self.http.clone(),
                channel_id: channel,
            })),
            Err(e) => {
                warn!(channel_id, "channel lookup failed: {e}");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ChannelDirectory for DiscordGateway {
    async fn list_guilds(&self) -> anyhow::Result<Vec<GuildInfo>> {
        let guilds = self
            .http
            .get_guilds(None, None)
            .await
            .context("failed to fetch guilds")?;
        Ok(guilds
            .into_iter()
            .map(|g| GuildInfo {
                id: g.id.to_string(),
                name: g.name,
            })
            .collect())
    }

    async fn list_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelInfo>> {
        let id = parse_snowflake(guild_id).context("guild id is not a valid snowflake")?;
        let channels = self
            .http
            .get_channels(GuildId::new(id))
            .await
            .context("failed to fetch guild channels")?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == ChannelType::Text)
            .map(|c| ChannelInfo {
                id: c.id.to_string(),
                name: c.name,
            })
            .collect())
    }

    async fn channel_name(&self, channel_id: &str) -> anyhow::Result<String> {
        let id = parse_snowflake(channel_id).context("channel id is not a valid snowflake")?;
        let channel = self
            .http
            .get_channel(ChannelId::new(id))
            .await
            .context("failed to fetch channel")?;
        channel
            .guild()
            .map(|c| c.name)
            .context("channel is not a guild text channel")
    }
}

/// A running Discord client plus the REST-side gateway object.
pub struct DiscordBot {
    pub gateway: Arc<DiscordGateway>,
    shard_manager: Arc<serenity::gateway::ShardManager>,
    client_handle: JoinHandle<()>,
}

impl DiscordBot {
    /// Connect to Discord and spawn the gateway client.
    pub async fn start(token: &str) -> anyhow::Result<Self> {
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;

        let mut client = Client::builder(token, intents)
            .event_handler(handler::ReadyHandler)
            .await
            .context("Failed to create Discord client")?;

        let http = client.http.clone();
        let shard_manager = client.shard_manager.clone();

        let client_handle = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!("Discord client error: {e}");
            }
        });

        info!("Discord client started");

        Ok(Self {
            gateway: Arc::new(DiscordGateway::new(http)),
            shard_manager,
            client_handle,
        })
    }

    /// Shut the gateway connection down and wait for the client task.
    pub async fn shutdown(self) {
        self.shard_manager.shutdown_all().await;
        let _ = self.client_handle.await;
        info!("Discord client stopped");
    }
}
