//! Per-host worker
//!
//! One worker runs per participating host. It pulls tasks from its own
//! channel, fetches them one at a time, and pauses for the politeness delay
//! after every request that reached the server. It stops when the scheduler
//! closes its channel.

use crate::crawler::fetcher::{PageFetcher, PageResult};
use crate::crawler::scheduler::Task;
use crate::robots::RobotsPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info};

/// Fetch loop for one host
pub struct HostWorker {
    pub host_id: i64,
    /// Host key, used to tell same-host redirects from external ones
    pub name: String,
    pub robots: RobotsPolicy,
    pub fetcher: Arc<PageFetcher>,
    pub delay: Duration,
}

impl HostWorker {
    /// Runs until the task channel is closed and drained
    ///
    /// Returns the number of tasks processed.
    pub async fn run(self, mut tasks: Receiver<Task>, results: Sender<PageResult>) -> usize {
        let mut processed = 0;
        info!("Worker for {} started", self.name);

        while let Some(task) = tasks.recv().await {
            debug!("[{}] fetching {}", self.name, task.url);
            let fetched = self.fetcher.fetch(&task, &self.name, &self.robots).await;
            processed += 1;

            if results.send(fetched.result).await.is_err() {
                debug!("[{}] result channel closed, stopping", self.name);
                break;
            }

            if fetched.responded && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        info!("Worker for {} finished after {} tasks", self.name, processed);
        processed
    }
}
