//! Access groups: stored groups and the virtual groups computed from platform
//! roles and users. Every group kind shares one identifier space so group ids can
//! key a single map regardless of where the group comes from.

mod dynamic;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dynamic::{DynamicGroup, DynamicGroupType, ID_SEPARATOR, NOT_LOGGED_IN_LABEL};

use crate::identity::{Principal, UserDirectory};

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("invalid dynamic group type '{0}'")]
    InvalidGroupType(String),
    #[error("malformed group id '{0}'")]
    MalformedId(String),
    #[error("no {kind} found for dynamic group '{raw_id}'")]
    EntityNotFound { kind: &'static str, raw_id: String },
}

/// Common surface of persisted and virtual groups.
pub trait AccessGroup: Send + Sync {
    fn group_id(&self) -> &str;
    fn display_name(&self) -> Result<&str, GroupError>;
    fn is_dynamic(&self) -> bool;
}

impl AccessGroup for DynamicGroup {
    fn group_id(&self) -> &str { self.id() }
    fn display_name(&self) -> Result<&str, GroupError> { self.name() }
    fn is_dynamic(&self) -> bool { true }
}

/// An administrator-defined group record. How it is stored is up to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccessGroup for StoredGroup {
    fn group_id(&self) -> &str { &self.id }
    fn display_name(&self) -> Result<&str, GroupError> { Ok(&self.name) }
    fn is_dynamic(&self) -> bool { false }
}

/// Groups of mixed kinds keyed by their group id.
#[derive(Default)]
pub struct GroupMap {
    entries: BTreeMap<String, Box<dyn AccessGroup>>,
}

impl GroupMap {
    pub fn new() -> Self { Self::default() }

    /// Insert a group, replacing any group already registered under the same id.
    pub fn insert<G: AccessGroup + 'static>(&mut self, group: G) -> Option<Box<dyn AccessGroup>> {
        self.entries.insert(group.group_id().to_string(), Box::new(group))
    }

    pub fn get(&self, id: &str) -> Option<&dyn AccessGroup> {
        self.entries.get(id).map(|g| g.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool { self.entries.contains_key(id) }

    pub fn ids(&self) -> impl Iterator<Item = &str> { self.entries.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Every virtual group an administrator can pick from: the anonymous visitor plus one
/// group per platform role. User groups are created on demand by id.
pub fn available_groups(directory: Arc<dyn UserDirectory>) -> Vec<DynamicGroup> {
    let mut out = vec![DynamicGroup::not_logged_in(directory.clone())];
    for role in directory.roles() {
        out.push(DynamicGroup::role(role.slug, directory.clone()));
    }
    out
}

/// The virtual groups a caller belongs to.
pub fn memberships_of(principal: Option<&Principal>, directory: Arc<dyn UserDirectory>) -> Vec<DynamicGroup> {
    let Some(p) = principal else {
        return vec![DynamicGroup::not_logged_in(directory)];
    };
    let mut out = Vec::with_capacity(p.roles.len() + 1);
    out.push(DynamicGroup::user(p.user_id, directory.clone()));
    for role in &p.roles {
        out.push(DynamicGroup::role(role.clone(), directory.clone()));
    }
    out
}
