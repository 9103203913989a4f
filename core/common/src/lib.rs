//! Common utilities and types shared across the file engine crates.
//!
//! Provides the shared error taxonomy, the logical path type every
//! component agrees on, and the listing record returned by storage backends.

pub mod error;
pub mod path;

pub use error::{Error, ErrorCode, Result};
pub use path::{ObjectInfo, StoragePath};
