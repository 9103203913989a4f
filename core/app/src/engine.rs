//! Caller-facing file engine operations.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use fileengine_authz::{
    can_access, check_access, AclEntry, AclStore, AuthContext, CredentialVerifier, Permission,
};
use fileengine_common::{Error, ObjectInfo, Result, StoragePath};
use fileengine_storage::{rechunk, ByteStream, Storage, StorageEngine, CHUNK_SIZE};
use fileengine_tasks::{
    MemoryQueue, Task, TaskProcessor, TaskQueue, TaskStatus, Worker, WorkerConfig, WorkerHandle,
};

/// Role allowed to manage ACL entries.
pub const ADMIN_ROLE: &str = "admin";

/// The file engine API.
///
/// Each call verifies the credential, authorizes the extracted path for
/// the permission the operation needs, then either runs against storage
/// or enqueues a task for the worker.
pub struct FileEngine {
    storage: Arc<dyn Storage>,
    acl: Arc<dyn AclStore>,
    queue: Arc<dyn TaskQueue>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl FileEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        acl: Arc<dyn AclStore>,
        queue: Arc<dyn TaskQueue>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            storage,
            acl,
            queue,
            verifier,
        }
    }

    /// Build an engine from configuration with an in-process queue.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Storage client or ACL database cannot be opened
    pub fn from_config(
        config: &EngineConfig,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = StorageEngine::from_config(&config.storage)?;
        let acl = config.acl.open()?;
        let queue = MemoryQueue::new(config.worker.poll_interval());

        info!(backend = storage.name(), "File engine initialized");
        Ok(Self::new(Arc::new(storage), acl, Arc::new(queue), verifier))
    }

    /// A worker draining this engine's queue against its storage.
    pub fn worker(&self, config: &WorkerConfig) -> (Worker, WorkerHandle) {
        Worker::new(
            self.queue.clone(),
            TaskProcessor::new(self.storage.clone()),
            config,
        )
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    fn authenticate(&self, credential: &str) -> Result<AuthContext> {
        self.verifier.verify(credential)
    }

    fn authorize(&self, ctx: &AuthContext, path: &StoragePath, perm: Permission) -> Result<()> {
        check_access(ctx, &path.to_string_path(), perm, self.acl.as_ref()).map_err(|e| {
            debug!(user = %ctx.user_id, path = %path, permission = %perm, "Access denied");
            e
        })
    }

    /// Request creation of `name` under `parent`.
    ///
    /// Authorized as Write on the new folder's path. Returns the id of a
    /// pending task; the folder exists once the worker marks it `success`.
    ///
    /// # Errors
    /// - `Unauthenticated`, `PermissionDenied`
    /// - `PathOutsideRoot` / `PathEmpty` for an invalid target
    pub async fn create_folder(&self, credential: &str, parent: &str, name: &str) -> Result<String> {
        let ctx = self.authenticate(credential)?;
        let parent = StoragePath::parse(parent)?;
        let target = parent.join(name)?;
        target.require_named()?;
        self.authorize(&ctx, &target, Permission::Write)?;

        let id = self
            .queue
            .enqueue(Task::create_folder(&parent.to_string_path(), name))
            .await?;
        info!(task_id = %id, path = %target, user = %ctx.user_id, "Folder creation queued");
        Ok(id)
    }

    /// Entries directly under `prefix`. Authorized as List on the prefix.
    pub async fn list_objects(&self, credential: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let ctx = self.authenticate(credential)?;
        let prefix = StoragePath::parse(prefix)?;
        self.authorize(&ctx, &prefix, Permission::List)?;
        self.storage.list(&prefix).await
    }

    /// Atomically write `body` to `path`. Returns the bytes written.
    ///
    /// # Postconditions
    /// - The object is either absent or fully present with `body`
    pub async fn upload_object(&self, credential: &str, path: &str, body: ByteStream) -> Result<u64> {
        let ctx = self.authenticate(credential)?;
        let path = StoragePath::parse(path)?;
        path.require_named()?;
        self.authorize(&ctx, &path, Permission::Write)?;

        let size = self.storage.atomic_write(&path, body).await?;
        info!(path = %path, size, user = %ctx.user_id, "Object uploaded");
        Ok(size)
    }

    /// Stream an object in chunks of at most 64 KiB.
    pub async fn download_object(&self, credential: &str, path: &str) -> Result<ByteStream> {
        let ctx = self.authenticate(credential)?;
        let path = StoragePath::parse(path)?;
        path.require_named()?;
        self.authorize(&ctx, &path, Permission::Read)?;

        let stream = self.storage.open(&path).await?;
        Ok(rechunk(stream, CHUNK_SIZE))
    }

    /// Queue a move. Needs Delete on the source and Write on the target.
    pub async fn move_object(&self, credential: &str, src: &str, dst: &str) -> Result<String> {
        let ctx = self.authenticate(credential)?;
        let src = StoragePath::parse(src)?;
        let dst = StoragePath::parse(dst)?;
        src.require_named()?;
        dst.require_named()?;
        self.authorize(&ctx, &src, Permission::Delete)?;
        self.authorize(&ctx, &dst, Permission::Write)?;

        let id = self
            .queue
            .enqueue(Task::move_file(&src.to_string_path(), &dst.to_string_path()))
            .await?;
        info!(task_id = %id, from = %src, to = %dst, "Move queued");
        Ok(id)
    }

    /// Remove an object or a whole folder. Authorized as Delete.
    pub async fn delete_object(&self, credential: &str, path: &str) -> Result<()> {
        let ctx = self.authenticate(credential)?;
        let path = StoragePath::parse(path)?;
        path.require_named()?;
        self.authorize(&ctx, &path, Permission::Delete)?;

        self.storage.delete(&path).await?;
        info!(path = %path, user = %ctx.user_id, "Object deleted");
        Ok(())
    }

    /// Status of a previously queued task.
    pub async fn get_task_status(&self, credential: &str, task_id: &str) -> Result<TaskStatus> {
        self.authenticate(credential)?;
        self.queue.status(task_id).await
    }

    /// Store an ACL entry. Only callers holding the admin role may do this.
    pub fn set_acl(&self, credential: &str, entry: AclEntry) -> Result<()> {
        let ctx = self.authenticate(credential)?;
        if !ctx.has_role(ADMIN_ROLE) {
            warn!(user = %ctx.user_id, path = %entry.path, "Non-admin attempted to set ACL");
            return Err(Error::PermissionDenied("setting ACLs requires admin".to_string()));
        }

        info!(path = %entry.path, principal = %entry.principal, user = %ctx.user_id, "ACL entry stored");
        self.acl.set_acl(entry)
    }

    /// Whether the caller holds `perm` on `path`.
    pub fn check(&self, credential: &str, path: &str, perm: Permission) -> Result<bool> {
        let ctx = self.authenticate(credential)?;
        Ok(can_access(&ctx, path, perm, self.acl.as_ref()))
    }
}
