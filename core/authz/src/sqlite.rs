//! SQLite-backed ACL store.
//!
//! One row per `(path, principal_id)`; the permission set is stored as a
//! flat JSON key→boolean map.

use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::acl::{AclEntry, Principal};
use crate::permission::Permission;
use crate::store::{AclBatchStore, AclStore};
use fileengine_common::{Error, Result};

/// Relational ACL store with batched multi-path lookup.
pub struct SqliteAclStore {
    conn: Mutex<Connection>,
}

impl SqliteAclStore {
    /// Create or open an ACL database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(store_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS acl_entries (
                path TEXT NOT NULL,
                principal_id TEXT NOT NULL,
                permissions TEXT NOT NULL,
                UNIQUE(path, principal_id)
            );

            CREATE INDEX IF NOT EXISTS idx_acl_path ON acl_entries(path);
            "#,
        )
        .map_err(store_err)?;

        info!("ACL store opened successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("ACL connection poisoned".to_string()))
    }

    fn query(&self, sql: &str, paths: &[String]) -> Result<Vec<AclEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(paths.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (path, principal, permissions) = row.map_err(store_err)?;
            match decode_row(path, &principal, &permissions) {
                Some(entry) => entries.push(entry),
                None => debug!(principal = %principal, "Skipping undecodable ACL row"),
            }
        }
        Ok(entries)
    }
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

fn decode_row(path: String, principal: &str, permissions: &str) -> Option<AclEntry> {
    let principal: Principal = principal.parse().ok()?;
    let map: BTreeMap<Permission, bool> = serde_json::from_str(permissions).ok()?;
    Some(AclEntry {
        path,
        principal,
        permissions: AclEntry::permissions_from_map(&map),
    })
}

impl AclStore for SqliteAclStore {
    fn get_acls(&self, path: &str) -> Result<Vec<AclEntry>> {
        self.query(
            "SELECT path, principal_id, permissions FROM acl_entries WHERE path = ?1",
            &[path.to_string()],
        )
    }

    fn set_acl(&self, entry: AclEntry) -> Result<()> {
        let permissions = serde_json::to_string(&entry.permission_map())?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO acl_entries (path, principal_id, permissions)
            VALUES (?1, ?2, ?3)
            "#,
            params![entry.path, entry.principal.to_string(), permissions],
        )
        .map_err(store_err)?;

        debug!(path = %entry.path, principal = %entry.principal, "ACL entry stored");
        Ok(())
    }

    fn as_batch(&self) -> Option<&dyn AclBatchStore> {
        Some(self)
    }
}

impl AclBatchStore for SqliteAclStore {
    fn get_acls_for_paths(&self, paths: &[String]) -> Result<Vec<AclEntry>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=paths.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT path, principal_id, permissions FROM acl_entries WHERE path IN ({})",
            placeholders
        );
        self.query(&sql, paths)
    }
}
