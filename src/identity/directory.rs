//! Platform role/user directory consulted for group display names.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRecord {
    pub slug: String,
    pub label: String,
}

pub trait UserDirectory: Send + Sync {
    fn user_by_id(&self, id: u64) -> Option<UserRecord>;

    /// All roles known to the platform, ordered by slug.
    fn roles(&self) -> Vec<RoleRecord>;

    fn role_label(&self, slug: &str) -> Option<String> {
        self.roles().into_iter().find(|r| r.slug == slug).map(|r| r.label)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    roles: Vec<RoleRecord>,
}

/// In-memory directory, optionally seeded from a JSON document of the form
/// `{"users": [...], "roles": [{"slug": "..", "label": ".."}]}`.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: RwLock<HashMap<u64, UserRecord>>,
    roles: RwLock<BTreeMap<String, String>>,
}

impl StaticDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: DirectoryFile = serde_json::from_str(raw).context("parsing directory json")?;
        let dir = Self::new();
        for u in file.users { dir.insert_user(u); }
        for r in file.roles { dir.insert_role(r.slug, r.label); }
        Ok(dir)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading directory file {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().insert(user.id, user);
    }

    pub fn remove_user(&self, id: u64) -> Option<UserRecord> {
        self.users.write().remove(&id)
    }

    pub fn insert_role(&self, slug: impl Into<String>, label: impl Into<String>) {
        self.roles.write().insert(slug.into(), label.into());
    }
}

impl UserDirectory for StaticDirectory {
    fn user_by_id(&self, id: u64) -> Option<UserRecord> {
        self.users.read().get(&id).cloned()
    }

    fn roles(&self) -> Vec<RoleRecord> {
        self.roles
            .read()
            .iter()
            .map(|(slug, label)| RoleRecord { slug: slug.clone(), label: label.clone() })
            .collect()
    }

    fn role_label(&self, slug: &str) -> Option<String> {
        self.roles.read().get(slug).cloned()
    }
}
