//! Asynchronous task pipeline for the file engine.
//!
//! Producers enqueue tasks; a single-consumer worker pops them, runs them
//! against the storage engine and records `success` or `failed:<reason>`.

pub mod processor;
pub mod queue;
pub mod task;
pub mod worker;

pub use processor::TaskProcessor;
pub use queue::{MemoryQueue, TaskQueue};
pub use task::{Task, TaskKind, TaskStatus};
pub use worker::{Worker, WorkerConfig, WorkerHandle};
