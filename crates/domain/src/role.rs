use std::str::FromStr;

use opsboard_core::{AppError, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role names reserved for privileged, seed-managed roles.
pub const PROTECTED_ROLE_NAMES: [&str; 2] = ["CEO", "Admin"];

/// Returns whether a role name is reserved for privileged roles.
#[must_use]
pub fn is_protected_role_name(name: &str) -> bool {
    PROTECTED_ROLE_NAMES.contains(&name.trim())
}

/// Unique identifier for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true for the nil UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RoleId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid role id '{value}': {error}")))
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Named role carrying either an explicit grant set or full privilege.
///
/// Privilege is a stored attribute set when the role is seeded. It is never
/// derived from the display name, so renaming a role cannot change what it
/// may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    description: Option<String>,
    is_privileged: bool,
}

impl Role {
    /// Creates a role definition.
    #[must_use]
    pub fn new(
        id: RoleId,
        name: NonEmptyString,
        description: Option<String>,
        is_privileged: bool,
    ) -> Self {
        let description = description
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        Self {
            id,
            name,
            description,
            is_privileged,
        }
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional role description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the role bypasses explicit grants.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.is_privileged
    }

    /// Returns whether the role carries a reserved name.
    #[must_use]
    pub fn has_protected_name(&self) -> bool {
        is_protected_role_name(self.name.as_str())
    }

    /// Returns whether the role's grants and definition are immutable.
    ///
    /// A reserved name without the privileged flag is still treated as
    /// protected for editing.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.is_privileged || self.has_protected_name()
    }

    /// Returns the name/description pair shown to users.
    #[must_use]
    pub fn descriptor(&self) -> RoleDescriptor {
        RoleDescriptor {
            name: self.name.as_str().to_owned(),
            description: self.description.clone(),
        }
    }
}

/// Display projection of the current role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    /// Role name.
    pub name: String,
    /// Optional role description.
    pub description: Option<String>,
}
