//! fileengine CLI - operate a file engine from the command line.
//!
//! Storage, ACL store and worker settings come from a JSON config file
//! or, without one, from the environment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fileengine_app::{EngineConfig, FileEngine};
use fileengine_authz::{AclEntry, AuthContext, Permission, Principal, StaticTokenVerifier};
use fileengine_common::Error;
use fileengine_storage::ByteStream;
use fileengine_tasks::TaskStatus;

/// Token the CLI issues to itself for the configured identity.
const SESSION_TOKEN: &str = "cli-session";

#[derive(Parser)]
#[command(name = "fileengine")]
#[command(about = "File engine - folders and files over local disk, S3 or GCS")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file (default: read from environment).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User id to act as.
    #[arg(short, long, global = true, default_value = "cli")]
    user: String,

    /// Role held by the acting user; repeat for several.
    #[arg(short, long = "role", global = true, default_value = "admin")]
    roles: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a folder through the task pipeline and wait for it.
    Mkdir {
        /// Parent folder.
        #[arg(short, long, default_value = "/")]
        parent: String,

        /// Name of the new folder.
        name: String,
    },

    /// List entries directly under a folder.
    Ls {
        #[arg(default_value = "/")]
        prefix: String,
    },

    /// Upload a local file.
    Put {
        /// Local source file.
        source: PathBuf,

        /// Destination path in storage.
        dest: String,
    },

    /// Download an object to a local file.
    Get {
        /// Source path in storage.
        source: String,

        /// Local destination file.
        dest: PathBuf,
    },

    /// Move an object through the task pipeline and wait for it.
    Mv { src: String, dst: String },

    /// Delete an object or folder.
    Rm { path: String },

    /// Grant permissions to a principal on a path (admin only).
    Grant {
        path: String,

        /// `user:<id>` or `role:<name>`.
        principal: Principal,

        /// Comma-separated: read,write,delete,list.
        #[arg(value_delimiter = ',', required = true)]
        permissions: Vec<Permission>,
    },

    /// Check whether the acting user holds a permission on a path.
    Check { path: String, permission: Permission },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).context("Failed to load configuration")?,
        None => EngineConfig::from_env().context("Invalid environment configuration")?,
    };

    let verifier = StaticTokenVerifier::new()
        .with_token(SESSION_TOKEN, AuthContext::new(cli.user.clone(), cli.roles.clone()))?;
    let engine = FileEngine::from_config(&config, Arc::new(verifier))
        .context("Failed to initialize file engine")?;

    match cli.command {
        Commands::Mkdir { parent, name } => cmd_mkdir(&engine, &config, &parent, &name).await,
        Commands::Ls { prefix } => cmd_ls(&engine, &prefix).await,
        Commands::Put { source, dest } => cmd_put(&engine, &source, &dest).await,
        Commands::Get { source, dest } => cmd_get(&engine, &source, &dest).await,
        Commands::Mv { src, dst } => cmd_mv(&engine, &config, &src, &dst).await,
        Commands::Rm { path } => cmd_rm(&engine, &path).await,
        Commands::Grant {
            path,
            principal,
            permissions,
        } => cmd_grant(&engine, &path, principal, permissions),
        Commands::Check { path, permission } => cmd_check(&engine, &path, permission),
    }
}

/// Run a worker until the task reaches a terminal state.
async fn drain_task(engine: &FileEngine, config: &EngineConfig, task_id: &str) -> Result<TaskStatus> {
    let (worker, handle) = engine.worker(&config.worker);
    let running = tokio::spawn(worker.run());

    let status = loop {
        let status = engine
            .get_task_status(SESSION_TOKEN, task_id)
            .await
            .context("Failed to read task status")?;
        if status.is_terminal() {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    handle.shutdown();
    running.await.context("Worker task panicked")?;
    debug!(task_id, status = %status, "Task finished");
    Ok(status)
}

fn report(status: TaskStatus, done: &str) -> Result<()> {
    match status {
        TaskStatus::Failed(reason) => anyhow::bail!("Task failed: {}", reason),
        _ => {
            println!("{}", done);
            Ok(())
        }
    }
}

/// Create a folder.
async fn cmd_mkdir(engine: &FileEngine, config: &EngineConfig, parent: &str, name: &str) -> Result<()> {
    let task_id = engine
        .create_folder(SESSION_TOKEN, parent, name)
        .await
        .context("Failed to queue folder creation")?;
    info!(task_id = %task_id, "Folder creation queued");

    let status = drain_task(engine, config, &task_id).await?;
    report(status, &format!("Folder created: {}/{}", parent.trim_end_matches('/'), name))
}

/// List folder contents.
async fn cmd_ls(engine: &FileEngine, prefix: &str) -> Result<()> {
    let entries = engine
        .list_objects(SESSION_TOKEN, prefix)
        .await
        .context("Failed to list folder")?;

    if entries.is_empty() {
        println!("Folder is empty.");
    } else {
        println!("Contents of {}:", prefix);
        for entry in entries {
            if entry.is_dir {
                println!("  [DIR]  {}/", entry.name());
            } else {
                println!("  [FILE] {} ({} bytes)", entry.name(), entry.size);
            }
        }
    }

    Ok(())
}

/// Upload a local file.
async fn cmd_put(engine: &FileEngine, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", source.display(), dest);

    let file = tokio::fs::File::open(source)
        .await
        .context("Failed to open source file")?;
    let body: ByteStream = Box::pin(ReaderStream::new(file).map_err(Error::from));

    let size = engine
        .upload_object(SESSION_TOKEN, dest, body)
        .await
        .context("Failed to upload file")?;

    println!("File uploaded: {} ({} bytes)", dest, size);
    Ok(())
}

/// Download an object.
async fn cmd_get(engine: &FileEngine, source: &str, dest: &Path) -> Result<()> {
    let mut stream = engine
        .download_object(SESSION_TOKEN, source)
        .await
        .context("Failed to open object")?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .context("Failed to create destination file")?;
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read object")?;
        file.write_all(&chunk)
            .await
            .context("Failed to write destination file")?;
        written += chunk.len();
    }
    file.flush().await?;

    println!("Downloaded {} to {} ({} bytes)", source, dest.display(), written);
    Ok(())
}

/// Move an object.
async fn cmd_mv(engine: &FileEngine, config: &EngineConfig, src: &str, dst: &str) -> Result<()> {
    let task_id = engine
        .move_object(SESSION_TOKEN, src, dst)
        .await
        .context("Failed to queue move")?;

    let status = drain_task(engine, config, &task_id).await?;
    report(status, &format!("Moved {} to {}", src, dst))
}

/// Delete an object or folder.
async fn cmd_rm(engine: &FileEngine, path: &str) -> Result<()> {
    engine
        .delete_object(SESSION_TOKEN, path)
        .await
        .context("Failed to delete")?;
    println!("Deleted: {}", path);
    Ok(())
}

/// Store an ACL entry.
fn cmd_grant(engine: &FileEngine, path: &str, principal: Principal, permissions: Vec<Permission>) -> Result<()> {
    let entry = AclEntry::new(path, principal, permissions).context("Invalid ACL entry")?;
    let summary = entry
        .permissions
        .iter()
        .map(Permission::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let (path, principal) = (entry.path.clone(), entry.principal.clone());

    engine
        .set_acl(SESSION_TOKEN, entry)
        .context("Failed to store ACL entry")?;
    println!("Granted {} on {} to {}", summary, path, principal);
    Ok(())
}

/// Evaluate one permission.
fn cmd_check(engine: &FileEngine, path: &str, permission: Permission) -> Result<()> {
    let allowed = engine
        .check(SESSION_TOKEN, path, permission)
        .context("Failed to evaluate access")?;
    println!("{}: {} on {}", if allowed { "allow" } else { "deny" }, permission, path);
    Ok(())
}
