use std::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, trace};

/// Owns every background task of a session. Dropping the handle aborts the
/// tasks; `shutdown` additionally waits until none of them can run again.
pub struct PollingHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl PollingHandle {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        debug!("polling: all session tasks stopped");
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Runs `tick` every `period`, starting one period from now. Ticks of one
/// task never wait on another task.
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; connect() has just refreshed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            trace!(task = name, "polling: tick");
            tick().await;
        }
    })
}
