//! Access-control entries and the principals they name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::permission::Permission;
use fileengine_common::{Error, Result, StoragePath};

/// A user or role identity that can be granted permissions.
///
/// Rendered as `user:<id>` or `role:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Principal {
    User(String),
    Role(String),
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Principal::User(id.into())
    }

    pub fn role(name: impl Into<String>) -> Self {
        Principal::Role(name.into())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(id) => write!(f, "user:{}", id),
            Principal::Role(name) => write!(f, "role:{}", name),
        }
    }
}

impl FromStr for Principal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(Principal::User(id.to_string())),
            Some(("role", name)) if !name.is_empty() => Ok(Principal::Role(name.to_string())),
            _ => Err(Error::InvalidInput(format!("invalid principal: {}", s))),
        }
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.to_string()
    }
}

impl TryFrom<String> for Principal {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A stored grant of permissions to a principal at one exact path.
///
/// Entries never expire; storing a new entry for the same
/// `(path, principal)` supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Normalized path the grant is attached to.
    pub path: String,
    pub principal: Principal,
    pub permissions: BTreeSet<Permission>,
}

impl AclEntry {
    /// Create an entry, normalizing `path`.
    ///
    /// # Errors
    /// - `PathOutsideRoot` / `InvalidInput` from path normalization
    pub fn new(
        path: &str,
        principal: Principal,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<Self> {
        Ok(Self {
            path: StoragePath::parse(path)?.to_string_path(),
            principal,
            permissions: permissions.into_iter().collect(),
        })
    }

    pub fn grants(&self, perm: Permission) -> bool {
        self.permissions.contains(&perm)
    }

    /// Flat key→boolean form used for persistence.
    pub fn permission_map(&self) -> BTreeMap<Permission, bool> {
        Permission::ALL
            .iter()
            .map(|perm| (*perm, self.permissions.contains(perm)))
            .collect()
    }

    /// Rebuild the permission set from its persisted map.
    pub fn permissions_from_map(map: &BTreeMap<Permission, bool>) -> BTreeSet<Permission> {
        map.iter()
            .filter(|(_, granted)| **granted)
            .map(|(perm, _)| *perm)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_round_trip() {
        assert_eq!("user:42".parse::<Principal>().unwrap(), Principal::user("42"));
        assert_eq!(
            "role:editor".parse::<Principal>().unwrap(),
            Principal::role("editor")
        );
        assert_eq!(Principal::user("42").to_string(), "user:42");
        assert!("service:xyz".parse::<Principal>().is_err());
        assert!("user:".parse::<Principal>().is_err());
    }

    #[test]
    fn test_entry_normalizes_path() {
        let entry = AclEntry::new("projects//alpha/", Principal::user("1"), [Permission::Read]).unwrap();
        assert_eq!(entry.path, "/projects/alpha");
        assert!(entry.grants(Permission::Read));
        assert!(!entry.grants(Permission::Write));
    }

    #[test]
    fn test_permission_map_is_flat() {
        let entry = AclEntry::new("/p", Principal::role("editor"), [Permission::Write]).unwrap();
        let json = serde_json::to_string(&entry.permission_map()).unwrap();
        assert_eq!(
            json,
            r#"{"read":false,"write":true,"delete":false,"list":false}"#
        );

        let map: BTreeMap<Permission, bool> = serde_json::from_str(&json).unwrap();
        assert_eq!(AclEntry::permissions_from_map(&map), entry.permissions);
    }

    #[test]
    fn test_entry_serde() {
        let entry = AclEntry::new("/p", Principal::user("7"), [Permission::List]).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["principal"], "user:7");
        assert_eq!(json["permissions"][0], "list");
    }
}
