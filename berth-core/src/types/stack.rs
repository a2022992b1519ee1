//! Stack domain types.

use crate::git::GitAuth;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    /// Stack is tracked and deployable.
    #[default]
    Active,
    /// Stack is tracked but paused.
    Inactive,
    /// Last repository sync failed.
    Error,
}

impl StackStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StackStatus::Active => "active",
            StackStatus::Inactive => "inactive",
            StackStatus::Error => "error",
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A git-backed deployable unit with compose configuration and variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    /// Stack ID (time-sortable).
    pub id: Uuid,

    /// Globally unique name, immutable after creation.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// HTTPS or SSH repository URL.
    #[serde(default)]
    pub git_url: String,

    /// Branch to track.
    #[serde(default)]
    pub git_branch: String,

    /// Repository authentication.
    #[serde(default)]
    pub git_auth: GitAuth,

    /// Path to the compose file within the repository.
    #[serde(default)]
    pub compose_path: String,

    /// Default deployment variables.
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Custom labels for filtering.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub status: StackStatus,

    /// Last successful repository sync.
    pub last_sync: Option<DateTime<Utc>>,

    /// Last successful deployment.
    pub last_deploy: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a stack.
#[derive(Debug, Clone, Default)]
pub struct StackDraft {
    pub name: String,
    pub description: String,
    pub git_url: String,
    pub git_branch: String,
    pub git_auth: GitAuth,
    pub compose_path: String,
    pub variables: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

/// Partial update for a stack. `None` fields are left untouched.
///
/// A `name` that differs from the current one is rejected by the stack
/// service; renames are not allowed.
#[derive(Debug, Clone, Default)]
pub struct StackChange {
    pub name: Option<String>,
    pub description: Option<String>,
    pub git_url: Option<String>,
    pub git_branch: Option<String>,
    pub git_auth: Option<GitAuth>,
    pub compose_path: Option<String>,
    pub variables: Option<HashMap<String, String>>,
    pub labels: Option<HashMap<String, String>>,
}

impl StackChange {
    /// Whether the change touches any repository-related field.
    pub fn touches_git(&self) -> bool {
        self.git_url.is_some() || self.git_branch.is_some() || self.git_auth.is_some()
    }
}

impl Stack {
    /// Build a new stack from a draft. Status starts `active`.
    pub fn new(draft: StackDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: draft.name,
            description: draft.description,
            git_url: draft.git_url,
            git_branch: draft.git_branch,
            git_auth: draft.git_auth,
            compose_path: draft.compose_path,
            variables: draft.variables,
            labels: draft.labels,
            status: StackStatus::Active,
            last_sync: None,
            last_deploy: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial change to this stack (name excluded; the service
    /// validates it separately).
    pub fn apply(&mut self, change: StackChange) {
        if let Some(description) = change.description {
            self.description = description;
        }
        if let Some(git_url) = change.git_url {
            self.git_url = git_url;
        }
        if let Some(git_branch) = change.git_branch {
            self.git_branch = git_branch;
        }
        if let Some(git_auth) = change.git_auth {
            self.git_auth = git_auth;
        }
        if let Some(compose_path) = change.compose_path {
            self.compose_path = compose_path;
        }
        if let Some(variables) = change.variables {
            self.variables = variables;
        }
        if let Some(labels) = change.labels {
            self.labels = labels;
        }
    }

    /// Unique name index key.
    pub fn name_key(name: &str) -> String {
        format!("{}:name:{}", Self::PREFIX, name)
    }

    /// Index prefix for all stacks in a given status.
    pub fn status_prefix(status: StackStatus) -> String {
        format!("{}:status:{}:", Self::PREFIX, status.as_str())
    }

    /// Index prefix for all stacks carrying a given label.
    pub fn label_prefix(key: &str, value: &str) -> String {
        format!("{}:label:{}:{}:", Self::PREFIX, escape(key), escape(value))
    }
}

impl Record for Stack {
    const PREFIX: &'static str = "stack";

    fn id(&self) -> Uuid {
        self.id
    }

    fn index_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2 + self.labels.len());
        keys.push(Self::name_key(&self.name));
        keys.push(format!("{}{}", Self::status_prefix(self.status), self.id));
        for (key, value) in &self.labels {
            keys.push(format!("{}{}", Self::label_prefix(key, value), self.id));
        }
        keys
    }
}

/// Percent-escape `%` and `:` so user-supplied label text cannot break the
/// `:`-framed key layout.
fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_keys_cover_name_status_labels() {
        let mut draft = StackDraft { name: "web".to_string(), ..Default::default() };
        draft.labels.insert("team".to_string(), "infra".to_string());
        let stack = Stack::new(draft);

        let keys = stack.index_keys();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"stack:name:web".to_string()));
        assert!(keys.contains(&format!("stack:status:active:{}", stack.id)));
        assert!(keys.contains(&format!("stack:label:team:infra:{}", stack.id)));
    }

    #[test]
    fn test_label_escaping_preserves_key_framing() {
        let prefix = Stack::label_prefix("a:b", "c%d");
        assert_eq!(prefix, "stack:label:a%3Ab:c%25d:");
    }
}
