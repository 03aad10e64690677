//! Host scheduler for distributing the page budget across hosts
//!
//! This module handles:
//! - Splitting the page budget into per-host quotas
//! - Feeding bounded per-host task channels from an in-memory backlog
//! - Charging quota and the global task counter when a task is sent
//! - Closing task channels, which is the only stop signal a host worker gets
//!
//! The scheduler is owned by the write worker thread and never blocks: all
//! sends use `try_send`, a full channel simply leaves the URL in the backlog.

use std::collections::{BTreeMap, HashSet, VecDeque};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

/// A URL handed to a host worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Normalized URL to fetch
    pub url: String,
    /// Host the URL belongs to
    pub host_id: i64,
}

/// Computes the per-host quota `max(1, budget / hosts)`
pub fn per_host_quota(budget: i64, hosts: usize) -> i64 {
    if hosts == 0 {
        return 0;
    }
    (budget / hosts as i64).max(1)
}

/// Scheduling state of one host
struct HostSlot {
    name: String,
    sender: Option<Sender<Task>>,
    quota: i64,
    in_flight: usize,
    backlog: VecDeque<String>,
    queued: HashSet<String>,
}

impl HostSlot {
    fn is_open(&self) -> bool {
        self.sender.is_some()
    }
}

/// Distributes tasks to per-host channels under a global page budget
pub struct HostScheduler {
    slots: BTreeMap<i64, HostSlot>,
    tasks_left: i64,
}

impl HostScheduler {
    /// Creates a scheduler with `budget` tasks to hand out in total
    pub fn new(budget: i64) -> Self {
        Self {
            slots: BTreeMap::new(),
            tasks_left: budget.max(0),
        }
    }

    /// Registers a host with its task channel, quota and initial URLs
    pub fn add_host(
        &mut self,
        host_id: i64,
        name: impl Into<String>,
        sender: Sender<Task>,
        quota: i64,
        initial: Vec<String>,
    ) {
        let mut slot = HostSlot {
            name: name.into(),
            sender: Some(sender),
            quota,
            in_flight: 0,
            backlog: VecDeque::new(),
            queued: HashSet::new(),
        };

        for url in initial {
            if slot.queued.insert(url.clone()) {
                slot.backlog.push_back(url);
            }
        }

        self.slots.insert(host_id, slot);
    }

    /// Fills every task channel up to its capacity, then closes finished hosts
    pub fn start(&mut self) {
        let ids: Vec<i64> = self.slots.keys().copied().collect();
        for id in ids {
            while self.send_one(id) {}
        }
        self.close_finished();

        for (id, slot) in &self.slots {
            info!(
                "Host {} (id {}): {} tasks queued, {} in backlog, quota left {}",
                slot.name,
                id,
                slot.in_flight,
                slot.backlog.len(),
                slot.quota
            );
        }
    }

    /// Offers a newly discovered URL of a configured host
    ///
    /// The URL is kept only while the host is open and its backlog is
    /// shorter than its remaining quota. Returns true if it was kept.
    pub fn offer(&mut self, host_id: i64, url: &str) -> bool {
        let Some(slot) = self.slots.get_mut(&host_id) else {
            return false;
        };

        if !slot.is_open() || slot.backlog.len() as i64 >= slot.quota {
            return false;
        }

        if !slot.queued.insert(url.to_string()) {
            return false;
        }

        slot.backlog.push_back(url.to_string());
        true
    }

    /// Drops a URL the write worker already resolved from a host's backlog
    ///
    /// The URL stays known to the slot, so later offers of it are ignored.
    /// Returns true if it was still waiting in the backlog.
    pub fn forget(&mut self, host_id: i64, url: &str) -> bool {
        let Some(slot) = self.slots.get_mut(&host_id) else {
            return false;
        };

        let before = slot.backlog.len();
        slot.backlog.retain(|queued| queued != url);
        slot.backlog.len() != before
    }

    /// Records that a result for a task of `host_id` reached the write worker
    pub fn complete(&mut self, host_id: i64) {
        if let Some(slot) = self.slots.get_mut(&host_id) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }

    /// Sends at most one new task to every open host, then closes finished hosts
    pub fn top_up(&mut self) {
        let ids: Vec<i64> = self.slots.keys().copied().collect();
        for id in ids {
            self.send_one(id);
        }
        self.close_finished();
    }

    /// Returns true once every task channel has been closed
    pub fn is_finished(&self) -> bool {
        self.slots.values().all(|slot| !slot.is_open())
    }

    /// Number of tasks that may still be handed out across all hosts
    pub fn tasks_left(&self) -> i64 {
        self.tasks_left
    }

    /// Remaining quota of a host
    pub fn quota(&self, host_id: i64) -> Option<i64> {
        self.slots.get(&host_id).map(|slot| slot.quota)
    }

    /// Tries to move one URL from a host's backlog into its task channel
    fn send_one(&mut self, host_id: i64) -> bool {
        if self.tasks_left <= 0 {
            return false;
        }

        let Some(slot) = self.slots.get_mut(&host_id) else {
            return false;
        };
        if slot.quota <= 0 {
            return false;
        }
        let Some(sender) = slot.sender.as_ref() else {
            return false;
        };
        let Some(url) = slot.backlog.pop_front() else {
            return false;
        };

        match sender.try_send(Task { url, host_id }) {
            Ok(()) => {
                slot.quota -= 1;
                slot.in_flight += 1;
                self.tasks_left -= 1;
                true
            }
            Err(TrySendError::Full(task)) => {
                slot.backlog.push_front(task.url);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Worker for host {} has exited", slot.name);
                slot.sender = None;
                false
            }
        }
    }

    /// Closes channels of hosts that cannot receive more work
    ///
    /// A host closes when its quota is spent; all hosts close when the
    /// global budget is spent, or when nothing is in flight anywhere and no
    /// backlog can feed a channel (no future result can bring new links).
    fn close_finished(&mut self) {
        let budget_spent = self.tasks_left <= 0;
        let idle = self.slots.values().all(|slot| slot.in_flight == 0);

        for (id, slot) in self.slots.iter_mut() {
            if !slot.is_open() {
                continue;
            }
            if budget_spent || slot.quota <= 0 || idle {
                debug!(
                    "Closing task queue of host {} (id {}, quota left {})",
                    slot.name, id, slot.quota
                );
                slot.sender = None;
                slot.backlog.clear();
            }
        }
    }
}
