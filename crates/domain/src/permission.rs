use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use opsboard_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a permission catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionId(Uuid);

impl PermissionId {
    /// Creates a new random permission identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a permission identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PermissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for PermissionId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
            AppError::Validation(format!("invalid permission id '{value}': {error}"))
        })
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Checkable resource/action pair such as `orders:view`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    resource: String,
    action: String,
}

impl PermissionKey {
    /// Creates a validated key from its two halves.
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> AppResult<Self> {
        let resource = validate_segment("resource", resource.into())?;
        let action = validate_segment("action", action.into())?;

        Ok(Self { resource, action })
    }

    /// Returns the resource half.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action half.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }
}

impl FromStr for PermissionKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((resource, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission key '{value}' must use the 'resource:action' form"
            )));
        };

        Self::new(resource, action)
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action)
    }
}

fn validate_segment(label: &str, value: String) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!(
            "permission {label} must not be empty"
        )));
    }

    if trimmed.contains(':') {
        return Err(AppError::Validation(format!(
            "permission {label} '{trimmed}' must not contain ':'"
        )));
    }

    Ok(trimmed.to_owned())
}

/// Permission catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    name: String,
    description: Option<String>,
    key: PermissionKey,
}

impl Permission {
    /// Creates a catalog permission.
    #[must_use]
    pub fn new(
        id: PermissionId,
        name: impl Into<String>,
        description: Option<String>,
        key: PermissionKey,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description,
            key,
        }
    }

    /// Returns the catalog identifier.
    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Returns the human-readable permission name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the checkable resource/action pair.
    #[must_use]
    pub fn key(&self) -> &PermissionKey {
        &self.key
    }

    /// Returns the resource half of the key.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.key.resource()
    }

    /// Returns the action half of the key.
    #[must_use]
    pub fn action(&self) -> &str {
        self.key.action()
    }
}

/// Effective set of resource/action pairs held by a subject.
///
/// Lookups borrow their arguments so a synchronous check never allocates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    actions_by_resource: BTreeMap<String, BTreeSet<String>>,
}

impl PermissionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a set from catalog rows.
    ///
    /// Returns the keys that appeared more than once alongside the set; a
    /// duplicate pair breaks catalog uniqueness and callers report it.
    #[must_use]
    pub fn from_permissions<'a>(
        permissions: impl IntoIterator<Item = &'a Permission>,
    ) -> (Self, Vec<PermissionKey>) {
        let mut set = Self::empty();
        let mut duplicates = Vec::new();

        for permission in permissions {
            if !set.insert(permission.key().clone()) {
                duplicates.push(permission.key().clone());
            }
        }

        (set, duplicates)
    }

    /// Inserts a key, returning false when it was already present.
    pub fn insert(&mut self, key: PermissionKey) -> bool {
        self.actions_by_resource
            .entry(key.resource)
            .or_default()
            .insert(key.action)
    }

    /// Returns whether the pair is held.
    #[must_use]
    pub fn contains(&self, resource: &str, action: &str) -> bool {
        self.actions_by_resource
            .get(resource)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Returns the number of held pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions_by_resource.values().map(BTreeSet::len).sum()
    }

    /// Returns true when no pair is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions_by_resource.is_empty()
    }

    /// Iterates held pairs ordered by resource then action.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.actions_by_resource.iter().flat_map(|(resource, actions)| {
            actions
                .iter()
                .map(move |action| (resource.as_str(), action.as_str()))
        })
    }
}

impl FromIterator<PermissionKey> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionKey>>(iter: T) -> Self {
        let mut set = Self::empty();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// Outcome of toggling a role grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// The role now carries the permission.
    Granted,
    /// The role no longer carries the permission.
    Revoked,
}

impl GrantState {
    /// Returns a stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
        }
    }
}
