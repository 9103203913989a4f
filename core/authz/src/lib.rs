//! Path-scoped authorization for the file engine.
//!
//! Explicit per-path ACL entries are merged with role-based defaults.
//! Grants inherit from ancestor paths, nothing is allowed by default, and
//! stores that can fetch many paths at once are used through a single call.

pub mod acl;
pub mod context;
pub mod permission;
pub mod resolver;
pub mod roles;
pub mod sqlite;
pub mod store;

pub use acl::{AclEntry, Principal};
pub use context::{AuthContext, CredentialVerifier, StaticTokenVerifier};
pub use permission::Permission;
pub use resolver::{can_access, check_access};
pub use roles::role_grants;
pub use sqlite::SqliteAclStore;
pub use store::{AclBatchStore, AclStore, MemoryAclStore};
