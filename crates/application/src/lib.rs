//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod permission_resolver;
mod role_admin_service;
mod session_authorization;
mod session_ports;

#[cfg(test)]
mod test_support;

pub use access_ports::{
    AccessChange, AccessChangeFeed, AccessDirectory, CreateRoleInput, GrantInsertOutcome,
    RoleAdminRepository, UpdateRoleInput,
};
pub use permission_resolver::{
    AccessResolution, CachedAccess, PermissionCache, PermissionResolver, ResolvedAccess,
};
pub use role_admin_service::RoleAdminService;
pub use session_authorization::{
    AuthorizedSession, SessionAuthorization, SessionSnapshot, SessionState,
};
pub use session_ports::{SessionIdentity, SessionProvider};
