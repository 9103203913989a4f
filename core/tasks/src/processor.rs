//! Dispatches tasks to storage operations.

use std::sync::Arc;
use tracing::debug;

use crate::task::{Task, TaskKind};
use fileengine_common::{Result, StoragePath};
use fileengine_storage::Storage;

/// Runs a single task against the storage engine.
pub struct TaskProcessor {
    storage: Arc<dyn Storage>,
}

impl TaskProcessor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Execute `task`.
    ///
    /// # Errors
    /// - `UnknownTaskType` if no handler exists for the task type
    /// - `InvalidInput` for missing parameters
    /// - Path and storage errors from the operation itself
    pub async fn process(&self, task: &Task) -> Result<()> {
        let kind: TaskKind = task.kind.parse()?;
        debug!(task_id = %task.id, kind = %kind, "Processing task");

        match kind {
            TaskKind::CreateFolder => {
                let parent = StoragePath::parse(task.param("parent")?)?;
                let folder = parent.join(task.param("name")?)?;
                folder.require_named()?;
                self.storage.create_folder(&folder).await
            }
            TaskKind::MoveFile => {
                let src = StoragePath::parse(task.param("src")?)?;
                let dst = StoragePath::parse(task.param("dst")?)?;
                self.storage.move_object(&src, &dst).await
            }
            TaskKind::CompleteUpload => {
                let upload = StoragePath::parse(task.param("upload_tmp")?)?;
                let target = StoragePath::parse(task.param("target_path")?)?;
                let dst = target.join(task.param("filename")?)?;
                dst.require_named()?;
                if !target.is_root() {
                    self.storage.create_folder(&target).await?;
                }
                self.storage.move_object(&upload, &dst).await
            }
        }
    }
}
