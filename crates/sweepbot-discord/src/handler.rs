//! Serenity EventHandler for gateway lifecycle logging.

use serenity::async_trait;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tracing::info;

/// The bot consumes no gateway events beyond readiness; all deletion work
/// goes through the REST API. The handler only logs the connection.
pub struct ReadyHandler;

#[async_trait]
impl EventHandler for ReadyHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Discord gateway connected"
        );
    }
}
