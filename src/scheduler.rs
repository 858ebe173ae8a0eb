//! Cancellable periodic background tasks

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("scheduled task {0} needs a non-zero period")]
    ZeroPeriod(String),
}

/// A tokio task that runs a job on a fixed period until stopped
///
/// The first run happens immediately. A run in progress is allowed to finish;
/// `stop` only prevents the next one.
pub struct ScheduledTask {
    name: String,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn onto the current tokio runtime
    pub fn spawn<F, Fut>(
        name: impl Into<String>,
        period: Duration,
        mut job: F,
    ) -> Result<Self, ScheduleError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod(name));
        }
        let shutdown = Arc::new(Notify::new());

        let task_name = name.clone();
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => break,
                    _ = timer.tick() => {
                        log::trace!("Running scheduled task {}", task_name);
                        job().await;
                    }
                }
            }
            log::debug!("Scheduled task {} stopped", task_name);
        });

        log::debug!("Scheduled task {} every {:?}", name, period);
        Ok(Self {
            name,
            shutdown,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop to exit and wait for it
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                log::error!("Scheduled task {} panicked", self.name);
            }
        }
    }
}
