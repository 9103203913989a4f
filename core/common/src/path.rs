//! Logical paths shared by every storage backend and the authorization layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// A normalized POSIX-style path confined to a logical root.
///
/// The string form always begins with `/` and never contains `//` runs,
/// whether the backend is a hierarchical disk or a flat object store.
/// Construction resolves `.` and `..` lexically and refuses anything that
/// would climb above the root, so a `StoragePath` can never escape it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StoragePath {
    components: Vec<String>,
}

impl StoragePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Build a confined path from an ordered list of segments.
    ///
    /// Each segment may itself contain `/` separators. Absolute-looking
    /// segments are treated as relative to the root.
    ///
    /// # Errors
    /// - `PathOutsideRoot` if a `..` would climb above the root
    /// - `InvalidInput` if a component contains a NUL byte
    pub fn sanitize<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut components: Vec<String> = Vec::new();
        let mut raw = Vec::new();

        for segment in segments {
            let segment = segment.as_ref();
            raw.push(segment.to_string());
            for part in segment.split('/') {
                match part {
                    "" | "." => {}
                    ".." => {
                        if components.pop().is_none() {
                            return Err(Error::PathOutsideRoot(raw.join("/")));
                        }
                    }
                    name => {
                        if name.contains('\0') {
                            return Err(Error::InvalidInput(
                                "Path component cannot contain NUL".to_string(),
                            ));
                        }
                        components.push(name.to_string());
                    }
                }
            }
        }

        Ok(Self { components })
    }

    /// Parse a single path string.
    pub fn parse(path: &str) -> Result<Self> {
        Self::sanitize([path])
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Fail with `PathEmpty` unless the path names something below the root.
    pub fn require_named(&self) -> Result<&str> {
        self.name().ok_or(Error::PathEmpty)
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/folder name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join a relative path onto this one, re-applying confinement.
    pub fn join(&self, child: &str) -> Result<Self> {
        let base = self.to_string_path();
        Self::sanitize([base.as_str(), child])
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// This path followed by each ancestor up to and including the root,
    /// closest first.
    pub fn ancestors(&self) -> Vec<StoragePath> {
        (0..=self.components.len())
            .rev()
            .map(|len| Self {
                components: self.components[..len].to_vec(),
            })
            .collect()
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.to_string_path()
    }
}

impl TryFrom<String> for StoragePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// Entry returned by a storage listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Normalized logical path of the entry.
    pub path: String,
    /// Size in bytes (zero for folders).
    pub size: u64,
    /// Whether the entry is a logical folder.
    pub is_dir: bool,
}

impl ObjectInfo {
    pub fn file(path: &StoragePath, size: u64) -> Self {
        Self {
            path: path.to_string_path(),
            size,
            is_dir: false,
        }
    }

    pub fn folder(path: &StoragePath) -> Self {
        Self {
            path: path.to_string_path(),
            size: 0,
            is_dir: true,
        }
    }

    /// Last component of the entry path.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_storage_path_root() {
        let path = StoragePath::root();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "/");
        assert!(matches!(path.require_named(), Err(Error::PathEmpty)));
    }

    #[test]
    fn test_parse_normalizes_separators() {
        let path = StoragePath::parse("projects//alpha/./docs/").unwrap();
        assert_eq!(path.components(), &["projects", "alpha", "docs"]);
        assert_eq!(path.to_string_path(), "/projects/alpha/docs");
    }

    #[test]
    fn test_absolute_segments_are_relative() {
        let path = StoragePath::sanitize(["/projects", "/demo"]).unwrap();
        assert_eq!(path.to_string_path(), "/projects/demo");
    }

    #[test]
    fn test_dot_dot_resolved_inside_root() {
        let path = StoragePath::parse("a/b/../c").unwrap();
        assert_eq!(path.to_string_path(), "/a/c");
    }

    #[test]
    fn test_dot_dot_escaping_root_fails() {
        assert!(matches!(
            StoragePath::parse("../etc/passwd"),
            Err(Error::PathOutsideRoot(_))
        ));
        assert!(matches!(
            StoragePath::parse("/a/../../etc"),
            Err(Error::PathOutsideRoot(_))
        ));
        assert!(matches!(
            StoragePath::sanitize(["projects", "../../x"]),
            Err(Error::PathOutsideRoot(_))
        ));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(
            StoragePath::parse("a/b\0c"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_join_reapplies_confinement() {
        let base = StoragePath::parse("/projects").unwrap();
        assert_eq!(base.join("demo").unwrap().to_string_path(), "/projects/demo");
        assert!(base.join("../../x").is_err());
    }

    #[test]
    fn test_ancestors_closest_first() {
        let path = StoragePath::parse("/projects/alpha/docs").unwrap();
        let ancestors: Vec<String> = path.ancestors().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            ancestors,
            vec!["/projects/alpha/docs", "/projects/alpha", "/projects", "/"]
        );
        assert_eq!(StoragePath::root().ancestors().len(), 1);
    }

    #[test]
    fn test_serde_as_string() {
        let path = StoragePath::parse("a/b").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: StoragePath = serde_json::from_str("\"//a/./b\"").unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<StoragePath>("\"../x\"").is_err());
    }

    #[test]
    fn test_object_info_name() {
        let info = ObjectInfo::folder(&StoragePath::parse("/a/b/c").unwrap());
        assert_eq!(info.name(), "c");
        assert!(info.is_dir);
    }

    proptest! {
        #[test]
        fn prop_climbing_past_depth_is_rejected(
            names in proptest::collection::vec("[a-z0-9_]{1,8}", 0..6),
            extra in 1usize..4,
        ) {
            let mut parts: Vec<String> = names.clone();
            for _ in 0..(names.len() + extra) {
                parts.push("..".to_string());
            }
            parts.push("target".to_string());
            let result = StoragePath::sanitize(parts.iter());
            prop_assert!(matches!(result, Err(Error::PathOutsideRoot(_))));
        }

        #[test]
        fn prop_normalized_form(raw in "[a-z/.]{0,40}") {
            if let Ok(path) = StoragePath::parse(&raw) {
                let s = path.to_string_path();
                prop_assert!(s.starts_with('/'));
                prop_assert!(!s.contains("//"));
                prop_assert!(!path.components().iter().any(|c| c == ".." || c == "."));
                prop_assert_eq!(StoragePath::parse(&s).unwrap(), path);
            }
        }
    }
}
