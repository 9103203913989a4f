//! Static role table: default permissions granted to every holder of a role.

use crate::permission::Permission;

/// Default permission set for a role name. Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> &'static [Permission] {
    match role {
        "admin" => &[
            Permission::Read,
            Permission::Write,
            Permission::Delete,
            Permission::List,
        ],
        "editor" => &[Permission::Read, Permission::Write, Permission::List],
        "viewer" => &[Permission::Read, Permission::List],
        _ => &[],
    }
}

/// Whether `role` grants `perm` independent of path.
pub fn role_grants(role: &str, perm: Permission) -> bool {
    role_permissions(role).contains(&perm)
}
