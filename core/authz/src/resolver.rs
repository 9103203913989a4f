//! Decides whether a caller may perform an action on a path.
//!
//! Order of evaluation:
//! 1. Explicit ACL entries on the path or any ancestor, closest first.
//! 2. Role defaults from the static role table.
//! 3. Deny.
//!
//! Any ACL store failure denies outright; role defaults are not consulted
//! when the ACL store could not be read.

use tracing::{debug, warn};

use crate::acl::{AclEntry, Principal};
use crate::context::AuthContext;
use crate::permission::Permission;
use crate::roles::role_grants;
use crate::store::AclStore;
use fileengine_common::{Error, Result, StoragePath};

/// Whether `ctx` holds `perm` on `path`.
///
/// Never errors: every failure mode resolves to `false`.
pub fn can_access(ctx: &AuthContext, path: &str, perm: Permission, store: &dyn AclStore) -> bool {
    let candidates: Vec<String> = match StoragePath::parse(path) {
        Ok(parsed) => parsed
            .ancestors()
            .iter()
            .map(StoragePath::to_string_path)
            .collect(),
        Err(e) => {
            debug!(path, error = %e, "Denying access to unparseable path");
            return false;
        }
    };

    let entries = match fetch_entries(&candidates, store) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path, error = %e, "ACL lookup failed, denying access");
            return false;
        }
    };

    let principals = principals_of(ctx);
    let acl_allows = entries
        .iter()
        .any(|entry| entry.grants(perm) && principals.contains(&entry.principal));
    if acl_allows {
        debug!(path, user = %ctx.user_id, permission = %perm, "Allowed by ACL");
        return true;
    }

    if ctx.roles.iter().any(|role| role_grants(role, perm)) {
        debug!(path, user = %ctx.user_id, permission = %perm, "Allowed by role");
        return true;
    }

    false
}

/// Like [`can_access`], but yields `PermissionDenied` on refusal.
pub fn check_access(
    ctx: &AuthContext,
    path: &str,
    perm: Permission,
    store: &dyn AclStore,
) -> Result<()> {
    if can_access(ctx, path, perm, store) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!("{} on {}", perm, path)))
    }
}

fn principals_of(ctx: &AuthContext) -> Vec<Principal> {
    std::iter::once(Principal::user(ctx.user_id.clone()))
        .chain(ctx.roles.iter().cloned().map(Principal::role))
        .collect()
}

/// Entries for every candidate path, using the batched lookup when the store
/// offers one. A failed batch falls back to per-path lookups; a failed
/// per-path lookup aborts.
fn fetch_entries(candidates: &[String], store: &dyn AclStore) -> Result<Vec<AclEntry>> {
    if let Some(batch) = store.as_batch() {
        match batch.get_acls_for_paths(candidates) {
            Ok(entries) => return Ok(entries),
            Err(e) => warn!(error = %e, "Batched ACL lookup failed, retrying per path"),
        }
    }

    let mut entries = Vec::new();
    for candidate in candidates {
        entries.extend(store.get_acls(candidate)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteAclStore;
    use crate::store::{AclBatchStore, MemoryAclStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(user: &str, roles: &[&str]) -> AuthContext {
        AuthContext::new(user, roles.iter().copied())
    }

    #[test]
    fn test_role_fallback() {
        let store = MemoryAclStore::new();
        let viewer = ctx("1", &["viewer"]);

        assert!(can_access(&viewer, "/anything", Permission::Read, &store));
        assert!(can_access(&viewer, "/anything", Permission::List, &store));
        assert!(!can_access(&viewer, "/anything", Permission::Write, &store));

        let admin = ctx("2", &["admin"]);
        for perm in Permission::ALL {
            assert!(can_access(&admin, "/x/y", perm, &store));
        }
    }

    #[test]
    fn test_user_acl_overrides_role() {
        let store = MemoryAclStore::new();
        store
            .set_acl(AclEntry::new("/projects/alpha", Principal::user("42"), [Permission::Write]).unwrap())
            .unwrap();

        let user = ctx("42", &["viewer"]);
        assert!(can_access(&user, "/projects/alpha", Permission::Write, &store));
        assert!(can_access(&user, "/projects/alpha/report.txt", Permission::Write, &store));
        assert!(!can_access(&user, "/projects", Permission::Write, &store));

        let other = ctx("43", &["viewer"]);
        assert!(!can_access(&other, "/projects/alpha", Permission::Write, &store));
    }

    #[test]
    fn test_role_acl_inherits() {
        let store = MemoryAclStore::new();
        store
            .set_acl(AclEntry::new("/projects", Principal::role("contractor"), [Permission::Write]).unwrap())
            .unwrap();

        let contractor = ctx("7", &["contractor"]);
        assert!(can_access(&contractor, "/projects/alpha/docs", Permission::Write, &store));
        assert!(!can_access(&contractor, "/other", Permission::Write, &store));
    }

    #[test]
    fn test_default_deny() {
        let store = MemoryAclStore::new();
        let nobody = ctx("1", &[]);
        for perm in Permission::ALL {
            assert!(!can_access(&nobody, "/", perm, &store));
        }

        let err = check_access(&nobody, "/a", Permission::Delete, &store).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_unparseable_path_denied() {
        let store = MemoryAclStore::new();
        let admin = ctx("1", &["admin"]);
        assert!(!can_access(&admin, "/../etc", Permission::Read, &store));
    }

    /// Store whose per-path lookup always fails.
    struct BrokenStore;

    impl AclStore for BrokenStore {
        fn get_acls(&self, _path: &str) -> Result<Vec<AclEntry>> {
            Err(Error::Store("connection refused".to_string()))
        }

        fn set_acl(&self, _entry: AclEntry) -> Result<()> {
            Err(Error::Store("connection refused".to_string()))
        }
    }

    #[test]
    fn test_store_failure_fails_closed() {
        // Role table would allow this; the store error must win.
        let admin = ctx("1", &["admin"]);
        assert!(!can_access(&admin, "/a/b", Permission::Read, &BrokenStore));
    }

    /// Store whose batch call fails but per-path lookups work.
    struct FlakyBatchStore {
        inner: MemoryAclStore,
        per_path_calls: AtomicUsize,
    }

    impl AclStore for FlakyBatchStore {
        fn get_acls(&self, path: &str) -> Result<Vec<AclEntry>> {
            self.per_path_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_acls(path)
        }

        fn set_acl(&self, entry: AclEntry) -> Result<()> {
            self.inner.set_acl(entry)
        }

        fn as_batch(&self) -> Option<&dyn AclBatchStore> {
            Some(self)
        }
    }

    impl AclBatchStore for FlakyBatchStore {
        fn get_acls_for_paths(&self, _paths: &[String]) -> Result<Vec<AclEntry>> {
            Err(Error::Store("batch timeout".to_string()))
        }
    }

    #[test]
    fn test_batch_failure_falls_back_per_path() {
        let store = FlakyBatchStore {
            inner: MemoryAclStore::new(),
            per_path_calls: AtomicUsize::new(0),
        };
        store
            .set_acl(AclEntry::new("/a", Principal::user("5"), [Permission::Delete]).unwrap())
            .unwrap();

        let user = ctx("5", &[]);
        assert!(can_access(&user, "/a/b/c", Permission::Delete, &store));
        // "/a/b/c", "/a/b", "/a", "/"
        assert_eq!(store.per_path_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_sqlite_batch_resolution() {
        let store = SqliteAclStore::in_memory().unwrap();
        store
            .set_acl(AclEntry::new("/", Principal::role("auditor"), [Permission::List]).unwrap())
            .unwrap();

        let auditor = ctx("3", &["auditor"]);
        assert!(can_access(&auditor, "/deep/nested/path", Permission::List, &store));
        assert!(!can_access(&auditor, "/deep/nested/path", Permission::Read, &store));
    }
}
