//! Daily wall-clock trigger for the analysis pass.

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct DailySchedule {
    time: NaiveTime,
}

impl DailySchedule {
    pub fn new(time: NaiveTime) -> Self {
        Self { time }
    }

    /// First trigger strictly after `now`: today at the configured time if
    /// still ahead, otherwise tomorrow. A trigger that falls in a DST gap is
    /// moved to the next day.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let mut day = now.date_naive();
        for _ in 0..3 {
            if let Some(candidate) = tz.from_local_datetime(&day.and_time(self.time)).earliest() {
                if candidate > *now {
                    return Some(candidate);
                }
            }
            day = day.checked_add_days(Days::new(1))?;
        }
        None
    }

    /// Runs `task` at every trigger until `shutdown` resolves. The next trigger
    /// is recomputed from the wall clock after each run.
    pub async fn run<F, Fut, S>(&self, mut task: F, shutdown: S)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = Local::now();
            let (delay, due) = match self.next_after(&now) {
                Some(next) => {
                    info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "Next scheduled check");
                    let delay = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
                    (delay, true)
                }
                None => {
                    warn!("Could not compute next trigger, retrying in one hour");
                    (Duration::from_secs(3600), false)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
            if due {
                task().await;
            }
        }

        info!("Scheduler stopped");
    }
}
