//! Single-consumer worker loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::processor::TaskProcessor;
use crate::queue::TaskQueue;
use crate::task::{Task, TaskStatus};

/// Worker timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long one pop waits for a task before returning empty.
    pub poll_interval_ms: u64,
    /// Pause after an empty pop or a queue error.
    pub backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            backoff_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Pops tasks, runs them and records the outcome.
///
/// Never exits on task or queue failures; only a stop request ends the
/// loop, and a task already being processed is finished first.
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    processor: TaskProcessor,
    backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

/// Stops a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    /// Ask the worker to stop after its current task.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        processor: TaskProcessor,
        config: &WorkerConfig,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = watch::channel(false);
        let worker = Self {
            queue,
            processor,
            backoff: config.backoff(),
            shutdown: rx,
        };
        let handle = WorkerHandle {
            shutdown: Arc::new(tx),
        };
        (worker, handle)
    }

    /// Run until shutdown. Spawn this on a tokio task.
    pub async fn run(mut self) {
        info!("Task worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                popped = self.queue.pop() => popped,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match popped {
                Ok(Some(task)) => self.handle(task).await,
                Ok(None) => self.pause().await,
                Err(e) => {
                    warn!(error = %e, "Queue pop failed, backing off");
                    self.pause().await;
                }
            }
        }

        info!("Task worker shutting down");
    }

    async fn handle(&self, task: Task) {
        let status = match self.processor.process(&task).await {
            Ok(()) => {
                info!(task_id = %task.id, kind = %task.kind, "Task succeeded");
                TaskStatus::Success
            }
            Err(e) => {
                error!(task_id = %task.id, kind = %task.kind, error = %e, "Task failed");
                TaskStatus::Failed(e.public_message())
            }
        };

        if let Err(e) = self.queue.complete(&task.id, status).await {
            error!(task_id = %task.id, error = %e, "Failed to record task status");
        }
    }

    async fn pause(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use async_trait::async_trait;
    use fileengine_common::{Error, Result, StoragePath};
    use fileengine_storage::{Storage, StorageEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            backoff_ms: 10,
        }
    }

    async fn wait_terminal(queue: &dyn TaskQueue, id: &str) -> TaskStatus {
        for _ in 0..200 {
            let status = queue.status(id).await.unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", id);
    }

    #[tokio::test]
    async fn test_create_folder_scenario() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::local(temp.path()).unwrap());
        let queue = Arc::new(MemoryQueue::new(Duration::from_millis(10)));

        let (worker, handle) = Worker::new(
            queue.clone(),
            TaskProcessor::new(storage.clone()),
            &fast_config(),
        );
        let running = tokio::spawn(worker.run());

        let id = queue
            .enqueue(Task::create_folder("projects", "demo"))
            .await
            .unwrap();
        assert_eq!(wait_terminal(queue.as_ref(), &id).await, TaskStatus::Success);
        assert!(storage
            .exists(&StoragePath::parse("projects/demo").unwrap())
            .await
            .unwrap());
        assert!(temp.path().join("projects/demo").is_dir());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_type_does_not_stop_loop() {
        let storage = Arc::new(StorageEngine::in_memory());
        let queue = Arc::new(MemoryQueue::new(Duration::from_millis(10)));
        let (worker, handle) = Worker::new(
            queue.clone(),
            TaskProcessor::new(storage.clone()),
            &fast_config(),
        );
        let running = tokio::spawn(worker.run());

        let bad = queue
            .enqueue(Task::new("reindex", [("path", "/")]))
            .await
            .unwrap();
        let good = queue
            .enqueue(Task::create_folder("/", "after"))
            .await
            .unwrap();

        let status = wait_terminal(queue.as_ref(), &bad).await;
        assert_eq!(status.label(), "failed");
        assert!(status.to_string().starts_with("failed:unknown task type"));
        assert_eq!(wait_terminal(queue.as_ref(), &good).await, TaskStatus::Success);

        handle.shutdown();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_message_is_public() {
        let storage = Arc::new(StorageEngine::in_memory());
        let queue = Arc::new(MemoryQueue::new(Duration::from_millis(10)));
        let (worker, handle) = Worker::new(
            queue.clone(),
            TaskProcessor::new(storage),
            &fast_config(),
        );
        let running = tokio::spawn(worker.run());

        let id = queue
            .enqueue(Task::move_file("/missing", "/dst"))
            .await
            .unwrap();
        assert_eq!(
            wait_terminal(queue.as_ref(), &id).await,
            TaskStatus::Failed("not found".to_string())
        );

        handle.shutdown();
        running.await.unwrap();
    }

    /// Queue whose first pops fail with a transport error.
    struct FlakyQueue {
        inner: MemoryQueue,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl TaskQueue for FlakyQueue {
        async fn enqueue(&self, task: Task) -> Result<String> {
            self.inner.enqueue(task).await
        }

        async fn pop(&self) -> Result<Option<Task>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::Queue("connection reset".to_string()));
            }
            self.inner.pop().await
        }

        async fn complete(&self, id: &str, status: TaskStatus) -> Result<()> {
            self.inner.complete(id, status).await
        }

        async fn status(&self, id: &str) -> Result<TaskStatus> {
            self.inner.status(id).await
        }
    }

    #[tokio::test]
    async fn test_survives_queue_errors() {
        let queue = Arc::new(FlakyQueue {
            inner: MemoryQueue::new(Duration::from_millis(10)),
            failures_left: AtomicUsize::new(3),
        });
        let (worker, handle) = Worker::new(
            queue.clone(),
            TaskProcessor::new(Arc::new(StorageEngine::in_memory())),
            &fast_config(),
        );
        let id = queue.enqueue(Task::create_folder("/", "x")).await.unwrap();
        let running = tokio::spawn(worker.run());

        assert_eq!(wait_terminal(queue.as_ref(), &id).await, TaskStatus::Success);
        assert_eq!(queue.failures_left.load(Ordering::SeqCst), 0);

        handle.shutdown();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_pop() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
        let (worker, handle) = Worker::new(
            queue,
            TaskProcessor::new(Arc::new(StorageEngine::in_memory())),
            &WorkerConfig::default(),
        );
        let running = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();
    }
}
