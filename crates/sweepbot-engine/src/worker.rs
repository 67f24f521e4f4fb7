//! Per-task worker loop and next-fire computation.
//!
//! Each active task owns one worker: compute the next fire instant in the
//! task's timezone, sleep until then, purge, sleep one flat period, repeat.
//! The flat post-fire sleep is deliberate — the next cycle re-anchors to
//! wall-clock time, so minor drift never accumulates.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use sweepbot_types::{DeletionTask, Recurrence, StartTime};

use crate::channel::ChannelOps;
use crate::purge::purge;

/// Flat sleep after a successful purge, before recomputing the next fire.
pub fn period(recurrence: Recurrence) -> StdDuration {
    match recurrence {
        Recurrence::Daily => StdDuration::from_secs(24 * 3600),
        Recurrence::Weekly(_) => StdDuration::from_secs(7 * 24 * 3600),
    }
}

/// Next instant at which a task should fire, strictly after `now`.
///
/// Weekly: modular day offset to the target weekday; if that lands on today
/// but the start time has already passed (or is exactly now), push a full
/// week so the task never fires same-day in the past. Daily: today at the
/// start time, or tomorrow if already passed.
pub fn next_fire(now: DateTime<Tz>, start: StartTime, recurrence: Recurrence) -> DateTime<Tz> {
    let start_time = NaiveTime::from_hms_opt(u32::from(start.hour), u32::from(start.minute), 0)
        .unwrap_or(NaiveTime::MIN);

    let days_ahead = match recurrence {
        Recurrence::Daily => i64::from(now.time() >= start_time),
        Recurrence::Weekly(target) => {
            let offset = (i64::from(target.num_days_from_monday())
                - i64::from(now.weekday().num_days_from_monday()))
            .rem_euclid(7);
            if offset == 0 && now.time() >= start_time {
                7
            } else {
                offset
            }
        }
    };

    let naive = (now.date_naive() + Duration::days(days_ahead)).and_time(start_time);
    resolve_local(now.timezone(), naive)
}

/// Map a naive local datetime into the zone. Ambiguous local times (DST
/// fall-back) take the earlier instant; nonexistent ones (spring-forward gap)
/// take the first representable instant after the gap.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let mut probe = naive + Duration::minutes(30);
            loop {
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt;
                }
                probe += Duration::minutes(30);
            }
        }
    }
}

/// Worker loop for one task. Runs until the token is cancelled; purge
/// failures are absorbed by the executor's retry shell, so nothing short of
/// cancellation ends this loop.
pub(crate) async fn run(task: DeletionTask, channel: Arc<dyn ChannelOps>, cancel: CancellationToken) {
    let tz = match task.resolve_timezone() {
        Ok(tz) => tz,
        // The registry validates zones at creation, so this only fires if the
        // task file was edited by hand.
        Err(e) => {
            error!(task_id = %task.id, "worker cannot resolve timezone: {e}");
            return;
        }
    };

    loop {
        let now = Utc::now().with_timezone(&tz);
        let target = next_fire(now, task.start_time, task.recurrence);
        let wait = (target - now).to_std().unwrap_or(StdDuration::ZERO);
        info!(
            task_id = %task.id,
            channel = %task.channel.name,
            fire_at = %target,
            "next purge scheduled"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {}
        }

        let stats = tokio::select! {
            _ = cancel.cancelled() => break,
            stats = purge(channel.as_ref()) => stats,
        };
        info!(
            task_id = %task.id,
            channel = %task.channel.name,
            bulk = stats.bulk_deleted,
            individual = stats.individually_deleted,
            "scheduled purge performed, waiting for next period"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(period(task.recurrence)) => {}
        }
    }

    debug!(task_id = %task.id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Weekday;
    use chrono_tz::Europe::Paris;

    use crate::channel::{MessageRef, PurgeError};
    use sweepbot_types::{ChannelRef, TaskStatus};

    fn paris(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        Paris.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn start(s: &str) -> StartTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_weekly_upcoming_friday() {
        // Monday 10:00 Paris -> Friday 09:00 Paris, the same week.
        let now = paris(2024, 1, 1, 10, 0);
        let fire = next_fire(now, start("09:00"), Recurrence::Weekly(Weekday::Fri));
        assert_eq!(fire, paris(2024, 1, 5, 9, 0));
        assert_eq!(fire - now, Duration::hours(3 * 24 + 23));
    }

    #[test]
    fn test_weekly_same_day_past_start_pushes_full_week() {
        // Friday 09:30, start 09:00 -> next Friday, never same-day-in-the-past.
        let now = paris(2024, 1, 5, 9, 30);
        let fire = next_fire(now, start("09:00"), Recurrence::Weekly(Weekday::Fri));
        assert_eq!(fire, paris(2024, 1, 12, 9, 0));
    }

    #[test]
    fn test_weekly_same_day_exactly_at_start_pushes_full_week() {
        let now = paris(2024, 1, 5, 9, 0);
        let fire = next_fire(now, start("09:00"), Recurrence::Weekly(Weekday::Fri));
        assert_eq!(fire, paris(2024, 1, 12, 9, 0));
    }

    #[test]
    fn test_weekly_same_day_before_start_fires_today() {
        let now = paris(2024, 1, 5, 8, 59);
        let fire = next_fire(now, start("09:00"), Recurrence::Weekly(Weekday::Fri));
        assert_eq!(fire, paris(2024, 1, 5, 9, 0));
    }

    #[test]
    fn test_weekly_target_earlier_in_week_wraps() {
        // Friday -> Monday wraps the weekend.
        let now = paris(2024, 1, 5, 12, 0);
        let fire = next_fire(now, start("07:30"), Recurrence::Weekly(Weekday::Mon));
        assert_eq!(fire, paris(2024, 1, 8, 7, 30));
    }

    #[test]
    fn test_daily_before_start_fires_today() {
        let now = paris(2024, 1, 3, 6, 0);
        let fire = next_fire(now, start("23:15"), Recurrence::Daily);
        assert_eq!(fire, paris(2024, 1, 3, 23, 15));
    }

    #[test]
    fn test_daily_past_start_fires_tomorrow() {
        let now = paris(2024, 1, 3, 23, 30);
        let fire = next_fire(now, start("23:15"), Recurrence::Daily);
        assert_eq!(fire, paris(2024, 1, 4, 23, 15));
    }

    #[test]
    fn test_weekly_always_future_and_bounded() {
        let starts = ["00:00", "09:00", "12:34", "23:59"];
        let days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        for hour in [0, 6, 12, 23] {
            let now = paris(2024, 1, 3, hour, 17);
            for s in starts {
                for day in days {
                    let fire = next_fire(now, start(s), Recurrence::Weekly(day));
                    let ahead = fire - now;
                    assert!(ahead > Duration::zero(), "not future: {now} {s} {day:?}");
                    assert!(
                        ahead <= Duration::days(7) + Duration::minutes(1),
                        "too far ahead: {now} {s} {day:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_daily_always_future_within_a_day() {
        let starts = ["00:00", "04:30", "13:00", "23:59"];
        for hour in [0, 5, 13, 23] {
            for minute in [0, 29, 59] {
                let now = paris(2024, 7, 10, hour, minute);
                for s in starts {
                    let fire = next_fire(now, start(s), Recurrence::Daily);
                    let ahead = fire - now;
                    assert!(ahead > Duration::zero());
                    assert!(ahead <= Duration::hours(24));
                }
            }
        }
    }

    #[test]
    fn test_daily_start_in_dst_gap_lands_after_gap() {
        // Paris skips 02:00-03:00 on 2024-03-31; a 02:30 start resolves to
        // the first instant after the gap rather than panicking.
        let now = paris(2024, 3, 30, 12, 0);
        let fire = next_fire(now, start("02:30"), Recurrence::Daily);
        assert_eq!(fire, paris(2024, 3, 31, 3, 0));
    }

    /// Channel that records every history fetch; always observed empty, so a
    /// purge is two fetches (one per phase) and no deletions.
    #[derive(Default)]
    struct CountingChannel {
        history_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChannelOps for CountingChannel {
        async fn history(&self, _limit: u8) -> Result<Vec<MessageRef>, PurgeError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn delete_messages(&self, _batch: &[MessageRef]) -> Result<(), PurgeError> {
            Ok(())
        }

        async fn delete_message(&self, _message: &MessageRef) -> Result<(), PurgeError> {
            Ok(())
        }
    }

    fn daily_task() -> DeletionTask {
        DeletionTask {
            id: "worker-test".into(),
            channel: ChannelRef {
                id: "42".into(),
                name: "general".into(),
            },
            start_time: start("00:00"),
            recurrence: Recurrence::Daily,
            timezone: "UTC".into(),
            status: TaskStatus::Active,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_fires_then_cancel_stops_further_purges() {
        let channel = Arc::new(CountingChannel::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(daily_task(), channel.clone(), cancel.clone()));

        // A daily task fires within 24h of wall time; a full day of paused
        // time drives the loop through at least one purge.
        sleep(StdDuration::from_secs(25 * 3600)).await;
        let fired = channel.history_calls.load(Ordering::SeqCst);
        assert!(fired > 0, "worker never purged within a full day");

        // Cancellation ends the loop without the clock moving: the worker is
        // parked in one of its sleeps and must wake on the token, not a timer.
        cancel.cancel();
        let before = tokio::time::Instant::now();
        handle.await.unwrap();
        assert!(before.elapsed() < StdDuration::from_secs(1));

        sleep(StdDuration::from_secs(14 * 24 * 3600)).await;
        assert_eq!(channel.history_calls.load(Ordering::SeqCst), fired);
    }

    #[test]
    fn test_period_lengths() {
        assert_eq!(period(Recurrence::Daily), StdDuration::from_secs(86_400));
        assert_eq!(
            period(Recurrence::Weekly(Weekday::Tue)),
            StdDuration::from_secs(7 * 86_400)
        );
    }
}
