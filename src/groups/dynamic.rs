use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::GroupError;
use crate::identity::UserDirectory;

/// Separator between kind and raw id inside a composite group id.
pub const ID_SEPARATOR: char = '|';

/// Label shown for the anonymous-visitor group.
pub const NOT_LOGGED_IN_LABEL: &str = "Not logged in users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicGroupType {
    Role,
    User,
    NotLoggedIn,
}

impl DynamicGroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            DynamicGroupType::Role => "role",
            DynamicGroupType::User => "user",
            DynamicGroupType::NotLoggedIn => "not_logged_in",
        }
    }
}

impl fmt::Display for DynamicGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DynamicGroupType {
    type Err = GroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(DynamicGroupType::Role),
            "user" => Ok(DynamicGroupType::User),
            "not_logged_in" => Ok(DynamicGroupType::NotLoggedIn),
            other => Err(GroupError::InvalidGroupType(other.to_string())),
        }
    }
}

/// A group computed from platform roles/users instead of being stored.
///
/// Only [`DynamicGroup::id`] is ever persisted; everything else is derived.
#[derive(Clone)]
pub struct DynamicGroup {
    kind: DynamicGroupType,
    raw_id: String,
    id: String,
    name: OnceCell<String>,
    directory: Arc<dyn UserDirectory>,
}

impl DynamicGroup {
    pub fn new(kind: DynamicGroupType, raw_id: impl Into<String>, directory: Arc<dyn UserDirectory>) -> Self {
        let raw_id = raw_id.into();
        let id = format!("{}{}{}", kind.as_str(), ID_SEPARATOR, raw_id);
        Self { kind, raw_id, id, name: OnceCell::new(), directory }
    }

    /// Construct from an untyped kind name; unknown kinds fail with `InvalidGroupType`.
    pub fn parse(kind: &str, raw_id: impl Into<String>, directory: Arc<dyn UserDirectory>) -> Result<Self, GroupError> {
        let kind = kind.parse::<DynamicGroupType>()?;
        Ok(Self::new(kind, raw_id, directory))
    }

    /// Rebuild a group from its composite id, e.g. `role|editor`.
    pub fn from_id(id: &str, directory: Arc<dyn UserDirectory>) -> Result<Self, GroupError> {
        let Some((kind, raw_id)) = id.split_once(ID_SEPARATOR) else {
            return Err(GroupError::MalformedId(id.to_string()));
        };
        Self::parse(kind, raw_id, directory)
    }

    pub fn role(slug: impl Into<String>, directory: Arc<dyn UserDirectory>) -> Self {
        Self::new(DynamicGroupType::Role, slug, directory)
    }

    pub fn user(user_id: u64, directory: Arc<dyn UserDirectory>) -> Self {
        Self::new(DynamicGroupType::User, user_id.to_string(), directory)
    }

    pub fn not_logged_in(directory: Arc<dyn UserDirectory>) -> Self {
        Self::new(DynamicGroupType::NotLoggedIn, "0", directory)
    }

    pub fn kind(&self) -> DynamicGroupType { self.kind }

    pub fn raw_id(&self) -> &str { &self.raw_id }

    pub fn id(&self) -> &str { &self.id }

    /// Display name, resolved on first call and cached for the life of the instance.
    pub fn name(&self) -> Result<&str, GroupError> {
        self.name.get_or_try_init(|| self.resolve_name()).map(String::as_str)
    }

    /// Forget the cached name so the next `name()` call asks the directory again.
    pub fn reset_name(&mut self) {
        self.name.take();
    }

    fn resolve_name(&self) -> Result<String, GroupError> {
        match self.kind {
            DynamicGroupType::NotLoggedIn => Ok(NOT_LOGGED_IN_LABEL.to_string()),
            DynamicGroupType::User => {
                let raw = self.raw_id.trim();
                if raw.is_empty() || raw == "0" {
                    return Ok(NOT_LOGGED_IN_LABEL.to_string());
                }
                let not_found = || GroupError::EntityNotFound { kind: "user", raw_id: self.raw_id.clone() };
                let user_id = raw.parse::<u64>().map_err(|_| not_found())?;
                debug!(target: "filewarden::groups", "resolving user group name id={}", user_id);
                let user = self.directory.user_by_id(user_id).ok_or_else(not_found)?;
                Ok(format!("{} ({})", user.display_name, user.login))
            }
            DynamicGroupType::Role => {
                debug!(target: "filewarden::groups", "resolving role group name slug='{}'", self.raw_id);
                Ok(self.directory.role_label(&self.raw_id).unwrap_or_else(|| self.raw_id.clone()))
            }
        }
    }
}

impl fmt::Debug for DynamicGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicGroup")
            .field("id", &self.id)
            .field("name", &self.name.get())
            .finish()
    }
}

impl PartialEq for DynamicGroup {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for DynamicGroup {}

#[cfg(test)]
#[path = "dynamic_tests.rs"]
mod tests;
