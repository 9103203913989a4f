//! Application facade for the file engine.
//!
//! Wires storage, authorization and the task pipeline together and
//! exposes the caller-facing operations. Every operation authenticates
//! the caller and consults the authorization resolver before touching
//! storage or the queue.

pub mod config;
pub mod engine;

pub use config::{AclConfig, EngineConfig};
pub use engine::FileEngine;
