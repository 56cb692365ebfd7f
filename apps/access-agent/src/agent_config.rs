use std::env;

use opsboard_core::{AppError, AppResult};
use opsboard_domain::{PermissionKey, RoleId, UserId};
use opsboard_infrastructure::DEFAULT_ACCESS_CHANGE_CHANNEL;
use tracing_subscriber::EnvFilter;

/// Operator command selected by the first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    Migrate,
    Seed,
    Check {
        user_id: UserId,
        key: PermissionKey,
    },
    ToggleGrant {
        actor: UserId,
        role_id: RoleId,
        key: PermissionKey,
    },
    Watch,
}

impl AgentCommand {
    pub fn parse(args: &[String]) -> AppResult<Self> {
        let positional = |index: usize, name: &str| {
            args.get(index)
                .map(String::as_str)
                .ok_or_else(|| AppError::Validation(format!("missing <{name}> argument")))
        };

        match args.first().map(String::as_str) {
            None | Some("watch") => Ok(Self::Watch),
            Some("migrate") => Ok(Self::Migrate),
            Some("seed") => Ok(Self::Seed),
            Some("check") => Ok(Self::Check {
                user_id: positional(1, "user-id")?.parse()?,
                key: PermissionKey::new(positional(2, "resource")?, positional(3, "action")?)?,
            }),
            Some("toggle-grant") => Ok(Self::ToggleGrant {
                actor: positional(1, "actor-id")?.parse()?,
                role_id: positional(2, "role-id")?.parse()?,
                key: positional(3, "resource:action")?.parse()?,
            }),
            Some(other) => Err(AppError::Validation(format!(
                "unknown command '{other}'; expected migrate, seed, check, toggle-grant, or watch"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub command: AgentCommand,
    pub database_url: String,
    pub database_max_connections: u32,
    pub access_change_channel: String,
    pub agent_user_id: Option<UserId>,
    pub agent_email: Option<String>,
}

impl AgentConfig {
    pub fn load() -> AppResult<Self> {
        let args: Vec<String> = env::args().skip(1).collect();
        let command = AgentCommand::parse(&args)?;

        let database_url = required_env("DATABASE_URL")?;
        let database_max_connections = parse_env_u32("DATABASE_MAX_CONNECTIONS", 5)?;
        if database_max_connections == 0 {
            return Err(AppError::Validation(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        let access_change_channel = env::var("ACCESS_CHANGE_CHANNEL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ACCESS_CHANGE_CHANNEL.to_owned());
        validate_channel(access_change_channel.as_str())?;

        let agent_user_id = optional_env("ACCESS_AGENT_USER_ID")
            .map(|value| value.parse::<UserId>())
            .transpose()?;
        let agent_email = optional_env("ACCESS_AGENT_EMAIL");

        Ok(Self {
            command,
            database_url,
            database_max_connections,
            access_change_channel,
            agent_user_id,
            agent_email,
        })
    }

    pub fn require_agent_user_id(&self) -> AppResult<UserId> {
        self.agent_user_id.ok_or_else(|| {
            AppError::Validation("ACCESS_AGENT_USER_ID is required for watch".to_owned())
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn validate_channel(channel: &str) -> AppResult<()> {
    let mut characters = channel.chars();
    let valid_start = characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    let valid_rest = characters.all(|character| character.is_ascii_alphanumeric() || character == '_');

    if valid_start && valid_rest && channel.len() <= 63 {
        return Ok(());
    }

    Err(AppError::Validation(format!(
        "ACCESS_CHANGE_CHANNEL '{channel}' must be a SQL identifier"
    )))
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
