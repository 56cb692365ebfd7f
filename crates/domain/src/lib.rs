//! Domain entities and invariants for role-based access control.

#![forbid(unsafe_code)]

mod permission;
mod role;
mod user;

pub use permission::{GrantState, Permission, PermissionId, PermissionKey, PermissionSet};
pub use role::{PROTECTED_ROLE_NAMES, Role, RoleDescriptor, RoleId, is_protected_role_name};
pub use user::{EmailAddress, User, UserId};
