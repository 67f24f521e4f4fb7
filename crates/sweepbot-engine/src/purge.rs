//! Deletion executor: empty a channel of messages.
//!
//! Discord only allows bulk deletion of messages younger than 14 days, up to
//! 100 per call; anything older has to be removed one message at a time. The
//! executor runs the bulk phase first, then the individual phase, and wraps
//! both in a retry shell that absorbs rate limits and transient failures.

use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::channel::{ChannelOps, MessageRef, PurgeError};

/// History page size, also the bulk-delete batch ceiling.
pub const HISTORY_PAGE_LIMIT: u8 = 100;
/// Messages at or beyond this age cannot be bulk-deleted.
pub const BULK_MAX_AGE_DAYS: i64 = 14;
/// Pause between bulk-delete calls.
pub const BULK_DELETE_PAUSE: Duration = Duration::from_secs(5);
/// Pause between individual deletions.
pub const SINGLE_DELETE_PAUSE: Duration = Duration::from_secs(2);
/// Backoff after a transient (non-rate-limit) API failure.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);

/// Counts of messages removed by one purge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub bulk_deleted: u64,
    pub individually_deleted: u64,
}

/// Purge every message from a channel.
///
/// Retries until the channel is observed empty by both phases: a rate-limit
/// signal sleeps for the server-specified interval, any other transient
/// failure sleeps a fixed backoff. There is no retry cap; a permanently
/// failing channel shows up as a non-progressing worker, not an error.
pub async fn purge(channel: &dyn ChannelOps) -> PurgeStats {
    let mut stats = PurgeStats::default();
    loop {
        match run_phases(channel, &mut stats).await {
            Ok(()) => break,
            Err(PurgeError::RateLimited { retry_after }) => {
                warn!(?retry_after, "rate limited during purge, backing off");
                sleep(retry_after).await;
            }
            Err(PurgeError::Transient(msg)) => {
                warn!(error = %msg, "transient API failure during purge, retrying in {TRANSIENT_BACKOFF:?}");
                sleep(TRANSIENT_BACKOFF).await;
            }
        }
    }
    info!(
        bulk = stats.bulk_deleted,
        individual = stats.individually_deleted,
        "purge finished"
    );
    stats
}

async fn run_phases(channel: &dyn ChannelOps, stats: &mut PurgeStats) -> Result<(), PurgeError> {
    bulk_phase(channel, stats).await?;
    individual_phase(channel, stats).await
}

fn bulk_cutoff() -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::days(BULK_MAX_AGE_DAYS)
}

/// Bulk-delete everything younger than the age threshold, page by page.
///
/// Stops when a fetched page is empty or contains nothing under the
/// threshold; whatever remains is the individual phase's problem.
async fn bulk_phase(channel: &dyn ChannelOps, stats: &mut PurgeStats) -> Result<(), PurgeError> {
    loop {
        let page = channel.history(HISTORY_PAGE_LIMIT).await?;
        if page.is_empty() {
            return Ok(());
        }
        let cutoff = bulk_cutoff();
        let recent: Vec<MessageRef> = page.into_iter().filter(|m| m.created_at > cutoff).collect();
        if recent.is_empty() {
            return Ok(());
        }
        channel.delete_messages(&recent).await?;
        stats.bulk_deleted += recent.len() as u64;
        info!(count = recent.len(), "bulk deleted messages");
        sleep(BULK_DELETE_PAUSE).await;
    }
}

/// Remove messages at or beyond the age threshold one at a time, pausing
/// between calls to stay inside the per-route rate budget.
async fn individual_phase(
    channel: &dyn ChannelOps,
    stats: &mut PurgeStats,
) -> Result<(), PurgeError> {
    loop {
        let page = channel.history(HISTORY_PAGE_LIMIT).await?;
        if page.is_empty() {
            return Ok(());
        }
        let cutoff = bulk_cutoff();
        let old: Vec<MessageRef> = page.into_iter().filter(|m| m.created_at <= cutoff).collect();
        if old.is_empty() {
            return Ok(());
        }
        for message in &old {
            channel.delete_message(message).await?;
            stats.individually_deleted += 1;
            sleep(SINGLE_DELETE_PAUSE).await;
        }
    }
}
