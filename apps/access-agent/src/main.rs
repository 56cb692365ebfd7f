//! Opsboard access agent: migrations, catalog seeding, and live access checks.

#![forbid(unsafe_code)]

mod agent_config;
mod seed;

use std::sync::Arc;

use opsboard_application::{
    AccessChangeFeed, AccessDirectory, PermissionResolver, RoleAdminService, SessionAuthorization,
    SessionIdentity, SessionSnapshot, SessionState,
};
use opsboard_core::{AppError, AppResult};
use opsboard_domain::{PermissionKey, RoleId, UserId};
use opsboard_infrastructure::{
    FixedSessionProvider, PostgresAccessChangeFeed, PostgresAccessDirectory,
    PostgresRoleAdminRepository, configure_access_change_channel, published_access_change_channel,
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::agent_config::{AgentCommand, AgentConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AgentConfig::load()?;
    let pool = connect_pool(&config).await?;

    match config.command.clone() {
        AgentCommand::Migrate => {
            run_migrations(&pool).await?;
            configure_channel(&pool, &config).await;
            info!("migrations completed");
            Ok(())
        }
        AgentCommand::Seed => {
            run_migrations(&pool).await?;
            configure_channel(&pool, &config).await;
            seed::run(&pool).await
        }
        AgentCommand::Check { user_id, key } => check(pool, user_id, &key).await,
        AgentCommand::ToggleGrant {
            actor,
            role_id,
            key,
        } => toggle_grant(pool, actor, role_id, &key).await,
        AgentCommand::Watch => watch(pool, &config).await,
    }
}

async fn connect_pool(config: &AgentConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

async fn configure_channel(pool: &PgPool, config: &AgentConfig) {
    let channel = config.access_change_channel.as_str();
    if let Err(error) = configure_access_change_channel(pool, channel).await {
        warn!(
            channel,
            error = %error,
            "could not point notification triggers at the access change channel; set opsboard.access_change_channel manually"
        );
    }
}

fn build_resolver(pool: PgPool) -> Arc<PermissionResolver> {
    Arc::new(PermissionResolver::new(Arc::new(
        PostgresAccessDirectory::new(pool),
    )))
}

async fn check(pool: PgPool, user_id: UserId, key: &PermissionKey) -> AppResult<()> {
    let provider = Arc::new(FixedSessionProvider::new(SessionIdentity {
        user_id,
        email: None,
    }));
    let session = SessionAuthorization::new(build_resolver(pool), provider);
    session.restore_session().await?;

    if let SessionState::Denied { reason, .. } = session.state() {
        warn!(user_id = %user_id, reason = %reason, "access check resolved to denied");
    }

    let verdict = if session.has_permission(key.resource(), key.action()) {
        "allow"
    } else {
        "deny"
    };
    println!("{verdict}");
    Ok(())
}

async fn toggle_grant(
    pool: PgPool,
    actor: UserId,
    role_id: RoleId,
    key: &PermissionKey,
) -> AppResult<()> {
    let directory = Arc::new(PostgresAccessDirectory::new(pool.clone()));
    let resolver = Arc::new(PermissionResolver::new(directory.clone()));
    let service = RoleAdminService::new(
        resolver,
        directory.clone(),
        Arc::new(PostgresRoleAdminRepository::new(pool)),
    );

    let permission_id = directory
        .list_permissions()
        .await?
        .into_iter()
        .find(|permission| permission.key() == key)
        .map(|permission| permission.id())
        .ok_or_else(|| AppError::NotFound(format!("permission '{key}' was not found")))?;

    let state = service.toggle_grant(actor, role_id, permission_id).await?;
    println!("{}", state.as_str());
    Ok(())
}

async fn watch(pool: PgPool, config: &AgentConfig) -> AppResult<()> {
    let identity = SessionIdentity {
        user_id: config.require_agent_user_id()?,
        email: config.agent_email.clone(),
    };
    let provider = Arc::new(FixedSessionProvider::new(identity));
    let session = SessionAuthorization::new(build_resolver(pool.clone()), provider);
    let channel = config.access_change_channel.as_str();
    match published_access_change_channel(&pool).await {
        Ok(published) if published != channel => warn!(
            listening = channel,
            published = %published,
            "notification triggers publish to a different channel; run migrate to align them"
        ),
        Ok(_) => {}
        Err(error) => warn!(error = %error, "could not verify the access change channel"),
    }
    let mut feed = PostgresAccessChangeFeed::connect(&pool, channel).await?;

    let mut receiver = session.subscribe();
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let snapshot = receiver.borrow_and_update().clone();
            log_transition(&snapshot);
        }
    });

    if let Err(error) = session.restore_session().await {
        warn!(error = %error, "initial session restore failed");
    }

    loop {
        match feed.next_change().await {
            Ok(change) => {
                if let Err(error) = session.handle_access_change(change).await {
                    warn!(error = %error, "failed to apply access change");
                }
            }
            Err(AppError::Validation(message)) => {
                warn!(reason = %message, "skipping unrecognized access change");
            }
            Err(error) => return Err(error),
        }
    }
}

fn log_transition(snapshot: &SessionSnapshot) {
    let generation = snapshot.generation();
    match snapshot.state() {
        SessionState::Unauthenticated => info!(generation, "session unauthenticated"),
        SessionState::Resolving { user_id } => {
            info!(generation, user_id = %user_id, "session resolving")
        }
        SessionState::Authorized(session) => {
            let permissions = session
                .permissions()
                .iter()
                .map(|(resource, action)| format!("{resource}:{action}"))
                .collect::<Vec<_>>()
                .join(",");
            info!(
                generation,
                user_id = %session.user().id(),
                role = session.role().map(|role| role.name().as_str()).unwrap_or(""),
                is_privileged = session.is_privileged(),
                permissions = %permissions,
                "session authorized"
            );
        }
        SessionState::Denied { user_id, reason } => warn!(
            generation,
            user_id = user_id.map(|value| value.to_string()).unwrap_or_default(),
            reason = %reason,
            "session denied"
        ),
    }
}
