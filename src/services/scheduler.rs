use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// When a periodic task first fires and how often it repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Schedule {
    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }
}

/// Run `task` on `schedule` until `shutdown` flips to true.
///
/// A run that overruns its period delays the next one instead of bursting.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tracing::info!(
            "{} scheduled (first run in {:?}, then every {:?})",
            name,
            schedule.initial_delay,
            schedule.period
        );

        tokio::select! {
            _ = tokio::time::sleep(schedule.initial_delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::info!("{} stopped", name);
                return;
            }
        }

        let mut ticker = tokio::time::interval(schedule.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            tracing::debug!("{} running", name);
            task().await;
        }

        tracing::info!("{} stopped", name);
    })
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped: nobody can ask us to stop any more.
            std::future::pending::<()>().await;
        }
    }
}
