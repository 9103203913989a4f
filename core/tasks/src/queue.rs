//! Queue transport contract and the in-process queue.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use crate::task::{Task, TaskStatus};
use fileengine_common::{Error, Result};

/// Transport for tasks and their recorded statuses.
///
/// `pop` must hand each task to at most one consumer.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Queue a task and mark it `pending`. Returns the task id.
    async fn enqueue(&self, task: Task) -> Result<String>;

    /// Wait for the next task. `None` means nothing arrived within the
    /// transport's poll window.
    async fn pop(&self) -> Result<Option<Task>>;

    /// Record the terminal status of a task.
    async fn complete(&self, id: &str, status: TaskStatus) -> Result<()>;

    /// Current status of a task.
    ///
    /// # Errors
    /// - `NotFound` for ids never enqueued
    async fn status(&self, id: &str) -> Result<TaskStatus>;
}

/// FIFO queue living in process memory.
///
/// Statuses are retained until [`MemoryQueue::prune_finished`] drops the
/// terminal ones; pending tasks are never evicted. A pruned id reports
/// `NotFound` afterwards.
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Task>>,
    statuses: Mutex<HashMap<String, TaskStatus>>,
    notify: Notify,
    poll_window: Duration,
}

impl MemoryQueue {
    pub fn new(poll_window: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            poll_window,
        }
    }

    /// Number of tasks waiting to be popped.
    pub fn len(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every `success`/`failed` status. Returns how many were removed.
    pub fn prune_finished(&self) -> Result<usize> {
        let mut statuses = self.statuses.lock().map_err(poisoned)?;
        let before = statuses.len();
        statuses.retain(|_, status| !status.is_terminal());
        let removed = before - statuses.len();
        if removed > 0 {
            debug!(removed, "Pruned finished task statuses");
        }
        Ok(removed)
    }

    fn try_pop(&self) -> Result<Option<Task>> {
        let mut pending = self.pending.lock().map_err(poisoned)?;
        Ok(pending.pop_front())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Queue("queue lock poisoned".to_string())
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: Task) -> Result<String> {
        let id = task.id.clone();
        {
            let mut statuses = self.statuses.lock().map_err(poisoned)?;
            if statuses.contains_key(&id) {
                return Err(Error::AlreadyExists(format!("task {}", id)));
            }
            statuses.insert(id.clone(), TaskStatus::Pending);
        }
        self.pending.lock().map_err(poisoned)?.push_back(task);
        self.notify.notify_one();

        debug!(task_id = %id, "Task enqueued");
        Ok(id)
    }

    async fn pop(&self) -> Result<Option<Task>> {
        if let Some(task) = self.try_pop()? {
            return Ok(Some(task));
        }

        // A notify_one issued before we start waiting leaves a permit behind,
        // so an enqueue between the check above and this wait is not lost.
        let _ = tokio::time::timeout(self.poll_window, self.notify.notified()).await;
        self.try_pop()
    }

    async fn complete(&self, id: &str, status: TaskStatus) -> Result<()> {
        let mut statuses = self.statuses.lock().map_err(poisoned)?;
        statuses.insert(id.to_string(), status);
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<TaskStatus> {
        let statuses = self.statuses.lock().map_err(poisoned)?;
        statuses
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))
    }
}
