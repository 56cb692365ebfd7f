use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::{info, warn};

use opsboard_application::{AccessChange, AccessChangeFeed};
use opsboard_core::{AppError, AppResult};
use opsboard_domain::{PermissionId, RoleId, UserId};

/// Default notification channel used by the access change triggers.
pub const DEFAULT_ACCESS_CHANGE_CHANNEL: &str = "access_changes";

/// Access change feed backed by PostgreSQL `LISTEN`.
pub struct PostgresAccessChangeFeed {
    listener: PgListener,
}

impl PostgresAccessChangeFeed {
    /// Opens a dedicated listener connection and subscribes to `channel`.
    pub async fn connect(pool: &PgPool, channel: &str) -> AppResult<Self> {
        let mut listener = PgListener::connect_with(pool).await.map_err(|error| {
            AppError::Internal(format!("failed to open access change listener: {error}"))
        })?;

        listener.listen(channel).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to listen on access change channel '{channel}': {error}"
            ))
        })?;

        info!(channel, "listening for access changes");
        Ok(Self { listener })
    }
}

/// Points the notification triggers at `channel` for new database sessions.
pub async fn configure_access_change_channel(pool: &PgPool, channel: &str) -> AppResult<()> {
    let statement = sqlx::query_scalar::<_, String>(
        r#"
        SELECT format(
            'ALTER DATABASE %I SET opsboard.access_change_channel = %L',
            current_database(),
            $1::text
        )
        "#,
    )
    .bind(channel)
    .fetch_one(pool)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to build access change channel statement: {error}"))
    })?;

    sqlx::query(statement.as_str())
        .execute(pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to set access change channel '{channel}': {error}"
            ))
        })?;

    info!(channel, "configured access change channel for notification triggers");
    Ok(())
}

/// Returns the channel the notification triggers publish to from this pool's sessions.
pub async fn published_access_change_channel(pool: &PgPool) -> AppResult<String> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT COALESCE(
            NULLIF(current_setting('opsboard.access_change_channel', true), ''),
            $1::text
        )
        "#,
    )
    .bind(DEFAULT_ACCESS_CHANGE_CHANNEL)
    .fetch_one(pool)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to read access change channel: {error}"))
    })
}

#[async_trait]
impl AccessChangeFeed for PostgresAccessChangeFeed {
    async fn next_change(&mut self) -> AppResult<AccessChange> {
        let notification = self.listener.try_recv().await.map_err(|error| {
            AppError::Internal(format!("failed to receive access change: {error}"))
        })?;

        match notification {
            Some(notification) => parse_access_change(notification.payload()),
            None => {
                warn!("access change listener lost its connection; notifications may have been missed");
                Ok(AccessChange::FeedReset)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessChangePayload {
    table: String,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    id: Option<uuid::Uuid>,
    #[serde(default)]
    role_id: Option<uuid::Uuid>,
    #[serde(default)]
    permission_id: Option<uuid::Uuid>,
}

/// Decodes a trigger payload into an access change.
pub fn parse_access_change(payload: &str) -> AppResult<AccessChange> {
    let payload: AccessChangePayload = serde_json::from_str(payload).map_err(|error| {
        AppError::Validation(format!("invalid access change payload: {error}"))
    })?;

    let missing = |field: &str| {
        AppError::Validation(format!(
            "access change for table '{}' ({}) is missing '{field}'",
            payload.table,
            payload.op.as_deref().unwrap_or("unknown op")
        ))
    };

    match payload.table.as_str() {
        "users" => Ok(AccessChange::UserChanged {
            user_id: UserId::from_uuid(payload.id.ok_or_else(|| missing("id"))?),
        }),
        "roles" => Ok(AccessChange::RoleChanged {
            role_id: RoleId::from_uuid(payload.id.ok_or_else(|| missing("id"))?),
        }),
        "role_permissions" => Ok(AccessChange::GrantChanged {
            role_id: RoleId::from_uuid(payload.role_id.ok_or_else(|| missing("role_id"))?),
            permission_id: PermissionId::from_uuid(
                payload
                    .permission_id
                    .ok_or_else(|| missing("permission_id"))?,
            ),
        }),
        "permissions" => Ok(AccessChange::CatalogChanged),
        other => Err(AppError::Validation(format!(
            "access change for unknown table '{other}'"
        ))),
    }
}
