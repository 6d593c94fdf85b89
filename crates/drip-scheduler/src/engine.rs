use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use crate::schedule::Schedule;

/// In-process daily trigger for deployments without an external cron.
pub struct SchedulerEngine {
    schedule: Schedule,
}

impl SchedulerEngine {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Sleep until each scheduled instant and run `job`, until `shutdown`
    /// broadcasts `true` or its sender is dropped.
    ///
    /// A job in progress is allowed to finish; shutdown is observed between runs.
    pub async fn run<F, Fut>(self, mut shutdown: watch::Receiver<bool>, mut job: F)
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(cron = %self.schedule.cron_expression(), "scheduler engine started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let Some(next) = self.schedule.next_run(now) else {
                error!(schedule = ?self.schedule, "schedule has no next run; stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "waiting for next campaign run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!(scheduled_for = %next, "scheduled run starting");
                    job(next).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scheduler engine shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn far_schedule() -> Schedule {
        // Jobs here are no-ops, so it does not matter if midnight is close.
        Schedule::daily("00:00", true).unwrap()
    }

    #[tokio::test]
    async fn returns_immediately_when_already_shut_down() {
        let (_tx, rx) = watch::channel(true);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        SchedulerEngine::new(far_schedule())
            .run(rx, move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal_while_waiting() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SchedulerEngine::new(far_schedule()).run(rx, |_| async {}));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("engine did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn stops_when_sender_is_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SchedulerEngine::new(far_schedule()).run(rx, |_| async {}));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("engine did not stop")
            .unwrap();
    }
}
