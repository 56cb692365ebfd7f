//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod fixed_session_provider;
mod postgres_access_change_feed;
mod postgres_access_directory;
mod postgres_role_admin_repository;
mod postgres_rows;

pub use fixed_session_provider::FixedSessionProvider;
pub use postgres_access_change_feed::{
    DEFAULT_ACCESS_CHANGE_CHANNEL, PostgresAccessChangeFeed, configure_access_change_channel,
    parse_access_change, published_access_change_channel,
};
pub use postgres_access_directory::PostgresAccessDirectory;
pub use postgres_role_admin_repository::PostgresRoleAdminRepository;
