//! ACL persistence contracts and the in-memory store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::acl::AclEntry;
use fileengine_common::{Error, Result};

/// Persists ACL entries keyed by exact path and principal.
///
/// Lookups match paths exactly; inheritance is computed by the resolver.
/// Implementations serialize their own writes.
pub trait AclStore: Send + Sync {
    /// All entries stored for exactly `path`.
    fn get_acls(&self, path: &str) -> Result<Vec<AclEntry>>;

    /// Store an entry, superseding any entry for the same path and principal.
    fn set_acl(&self, entry: AclEntry) -> Result<()>;

    /// Batched lookup capability, if this store has one.
    fn as_batch(&self) -> Option<&dyn AclBatchStore> {
        None
    }
}

/// Optional capability: fetch entries for many paths in one call.
pub trait AclBatchStore: AclStore {
    fn get_acls_for_paths(&self, paths: &[String]) -> Result<Vec<AclEntry>>;
}

/// Process-local ACL store.
#[derive(Default)]
pub struct MemoryAclStore {
    entries: RwLock<HashMap<String, Vec<AclEntry>>>,
}

impl MemoryAclStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AclStore for MemoryAclStore {
    fn get_acls(&self, path: &str) -> Result<Vec<AclEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Store("ACL table poisoned".to_string()))?;
        Ok(entries.get(path).cloned().unwrap_or_default())
    }

    fn set_acl(&self, entry: AclEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Store("ACL table poisoned".to_string()))?;

        let at_path = entries.entry(entry.path.clone()).or_default();
        at_path.retain(|existing| existing.principal != entry.principal);
        at_path.push(entry);
        Ok(())
    }
}
